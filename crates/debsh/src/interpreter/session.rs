//! Shell session: working directory, variable scopes and the login stack

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::fs::resolve_path;
use crate::identity::{IdentityResult, IdentityStore, Principal};

const ROOT_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";
const USER_PATH: &str = "/usr/local/bin:/usr/bin:/bin:/usr/local/games:/usr/games";

/// How long a successful sudo authentication is remembered.
const SUDO_TIMEOUT_MINUTES: i64 = 15;

/// A suspended outer login, restored by `exit`.
#[derive(Debug, Clone)]
pub(crate) struct Login {
    pub user: Principal,
    pub cwd: PathBuf,
    pub oldpwd: Option<PathBuf>,
    pub locals: HashMap<String, String>,
}

/// Mutable per-session shell state.
#[derive(Debug, Clone)]
pub struct Session {
    /// Current working directory
    pub cwd: PathBuf,
    /// Previous working directory, for `cd -`
    pub oldpwd: Option<PathBuf>,
    /// Unexported variables
    pub locals: HashMap<String, String>,
    /// Exported variables
    pub exported: HashMap<String, String>,
    /// The authenticated identity
    pub user: Principal,
    pub hostname: String,
    pub last_exit_code: i32,
    /// Set by `exit` at the outermost login
    pub finished: bool,
    /// Host-provided variables below the synthesized ones
    pub(crate) base_env: HashMap<String, String>,
    pub(crate) logins: Vec<Login>,
    pub(crate) sudo_until: Option<DateTime<Utc>>,
    /// The caller while a command runs under sudo
    pub(crate) elevated_from: Option<String>,
}

impl Session {
    pub(crate) fn new(user: Principal, hostname: String, cwd: PathBuf) -> Self {
        Self {
            cwd,
            oldpwd: None,
            locals: HashMap::new(),
            exported: HashMap::new(),
            user,
            hostname,
            last_exit_code: 0,
            finished: false,
            base_env: HashMap::new(),
            logins: Vec::new(),
            sudo_until: None,
            elevated_from: None,
        }
    }

    /// The read-only environment derived from the identity and cwd.
    pub fn synthesized_env(&self) -> BTreeMap<String, String> {
        let mut env: BTreeMap<String, String> = self
            .base_env
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let home = self.user.home.display().to_string();
        let path = if self.user.is_root() { ROOT_PATH } else { USER_PATH };
        env.insert("HOME".into(), home);
        env.insert("PWD".into(), self.cwd.display().to_string());
        if let Some(old) = &self.oldpwd {
            env.insert("OLDPWD".into(), old.display().to_string());
        }
        env.insert("USER".into(), self.user.username.clone());
        env.insert("LOGNAME".into(), self.user.username.clone());
        env.insert("SHELL".into(), self.user.shell.clone());
        env.insert("PATH".into(), path.into());
        env.insert("UID".into(), self.user.uid.to_string());
        env.insert("GID".into(), self.user.gid.to_string());
        env.insert("HOSTNAME".into(), self.hostname.clone());
        env
    }

    /// `env` output source: synthesized environment plus exported variables.
    pub fn environment(&self) -> BTreeMap<String, String> {
        let mut env = self.synthesized_env();
        for (name, value) in &self.exported {
            env.insert(name.clone(), value.clone());
        }
        env
    }

    /// Resolve a variable: local, then exported, then environment.
    pub fn lookup(&self, name: &str) -> Option<String> {
        if name == "?" {
            return Some(self.last_exit_code.to_string());
        }
        self.locals
            .get(name)
            .or_else(|| self.exported.get(name))
            .cloned()
            .or_else(|| self.synthesized_env().remove(name))
    }

    /// Resolve a user-supplied path against cwd and home.
    pub fn resolve(&self, path: &str) -> PathBuf {
        resolve_path(&self.cwd, &self.user.home, path)
    }

    /// Change directory, remembering the previous one.
    pub fn change_dir(&mut self, dir: PathBuf) {
        let previous = std::mem::replace(&mut self.cwd, dir);
        self.oldpwd = Some(previous);
    }

    /// Abbreviated cwd for prompts (`~` for home).
    pub fn display_cwd(&self) -> String {
        let home: &Path = &self.user.home;
        if self.cwd == home {
            "~".to_string()
        } else if let Ok(rest) = self.cwd.strip_prefix(home)
            && home != Path::new("/")
        {
            format!("~/{}", rest.display())
        } else {
            self.cwd.display().to_string()
        }
    }

    /// `user@host:~$ ` prompt string.
    pub fn prompt_string(&self) -> String {
        let sigil = if self.user.is_root() { '#' } else { '$' };
        format!(
            "{}@{}:{}{} ",
            self.user.username,
            self.hostname,
            self.display_cwd(),
            sigil
        )
    }

    /// Every user with an active login in this session.
    pub fn logged_in(&self) -> Vec<String> {
        let mut users: Vec<String> = Vec::new();
        let names = self
            .logins
            .iter()
            .map(|l| &l.user.username)
            .chain(self.elevated_from.as_ref())
            .chain([&self.user.username]);
        for name in names {
            if !users.contains(name) {
                users.push(name.clone());
            }
        }
        users
    }

    /// Depth of nested `su` logins.
    pub fn login_depth(&self) -> usize {
        self.logins.len()
    }

    /// Start a nested login as `user`. A login shell starts in the home.
    pub(crate) fn push_login(&mut self, user: Principal, login_shell: bool) {
        let frame = Login {
            user: std::mem::replace(&mut self.user, user),
            cwd: self.cwd.clone(),
            oldpwd: self.oldpwd.clone(),
            locals: std::mem::take(&mut self.locals),
        };
        self.logins.push(frame);
        self.sudo_until = None;
        if login_shell {
            self.cwd = self.user.home.clone();
            self.oldpwd = None;
        }
    }

    /// Leave the current login. Returns false at the outermost level.
    pub(crate) fn pop_login(&mut self) -> bool {
        let Some(frame) = self.logins.pop() else {
            return false;
        };
        self.user = frame.user;
        self.cwd = frame.cwd;
        self.oldpwd = frame.oldpwd;
        self.locals = frame.locals;
        self.sudo_until = None;
        true
    }

    pub(crate) fn sudo_cached(&self) -> bool {
        self.sudo_until.is_some_and(|until| Utc::now() < until)
    }

    pub(crate) fn remember_sudo(&mut self) {
        self.sudo_until = Some(Utc::now() + Duration::minutes(SUDO_TIMEOUT_MINUTES));
    }

    /// Capture the persistable part of the session.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            user: self.user.username.clone(),
            cwd: self.cwd.clone(),
            oldpwd: self.oldpwd.clone(),
            locals: self.locals.clone().into_iter().collect(),
            exported: self.exported.clone().into_iter().collect(),
            logins: self
                .logins
                .iter()
                .map(|l| LoginSnapshot {
                    user: l.user.username.clone(),
                    cwd: l.cwd.clone(),
                    oldpwd: l.oldpwd.clone(),
                    locals: l.locals.clone().into_iter().collect(),
                })
                .collect(),
            last_exit_code: self.last_exit_code,
        }
    }
}

impl SessionSnapshot {
    /// Rebuild a session, resolving every saved login against `identity`.
    pub(crate) async fn restore(
        &self,
        identity: &IdentityStore,
        hostname: String,
        base_env: HashMap<String, String>,
    ) -> IdentityResult<Session> {
        let user = identity.principal(&self.user).await?;
        let mut session = Session::new(user, hostname, self.cwd.clone());
        session.oldpwd = self.oldpwd.clone();
        session.locals = self.locals.clone().into_iter().collect();
        session.exported = self.exported.clone().into_iter().collect();
        session.last_exit_code = self.last_exit_code;
        session.base_env = base_env;
        for login in &self.logins {
            session.logins.push(Login {
                user: identity.principal(&login.user).await?,
                cwd: login.cwd.clone(),
                oldpwd: login.oldpwd.clone(),
                locals: login.locals.clone().into_iter().collect(),
            });
        }
        Ok(session)
    }
}

/// Serializable session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub user: String,
    pub cwd: PathBuf,
    pub oldpwd: Option<PathBuf>,
    pub locals: BTreeMap<String, String>,
    pub exported: BTreeMap<String, String>,
    /// Outer logins, outermost first
    pub logins: Vec<LoginSnapshot>,
    pub last_exit_code: i32,
}

/// Serializable suspended login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginSnapshot {
    pub user: String,
    pub cwd: PathBuf,
    pub oldpwd: Option<PathBuf>,
    pub locals: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(name: &str, uid: u32) -> Principal {
        Principal {
            username: name.into(),
            uid,
            gid: uid,
            group: name.into(),
            groups: vec![name.into()],
            home: if uid == 0 {
                "/root".into()
            } else {
                format!("/home/{name}").into()
            },
            shell: "/bin/bash".into(),
        }
    }

    fn session() -> Session {
        Session::new(principal("user", 1000), "debian".into(), "/home/user".into())
    }

    #[test]
    fn test_lookup_priority() {
        let mut s = session();
        s.base_env.insert("X".into(), "E".into());
        assert_eq!(s.lookup("X").as_deref(), Some("E"));
        s.exported.insert("X".into(), "S".into());
        assert_eq!(s.lookup("X").as_deref(), Some("S"));
        s.locals.insert("X".into(), "L".into());
        assert_eq!(s.lookup("X").as_deref(), Some("L"));
        assert_eq!(s.lookup("NOPE"), None);
    }

    #[test]
    fn test_synthesized_env() {
        let mut s = session();
        s.last_exit_code = 3;
        assert_eq!(s.lookup("?").as_deref(), Some("3"));
        assert_eq!(s.lookup("HOME").as_deref(), Some("/home/user"));
        assert_eq!(s.lookup("UID").as_deref(), Some("1000"));
        assert_eq!(s.lookup("PATH").as_deref(), Some(USER_PATH));
        assert_eq!(s.lookup("OLDPWD"), None);

        s.change_dir("/tmp".into());
        assert_eq!(s.lookup("PWD").as_deref(), Some("/tmp"));
        assert_eq!(s.lookup("OLDPWD").as_deref(), Some("/home/user"));
    }

    #[test]
    fn test_prompt_string() {
        let mut s = session();
        assert_eq!(s.prompt_string(), "user@debian:~$ ");
        s.cwd = "/home/user/src".into();
        assert_eq!(s.prompt_string(), "user@debian:~/src$ ");
        s.cwd = "/etc".into();
        assert_eq!(s.prompt_string(), "user@debian:/etc$ ");
    }

    #[test]
    fn test_login_stack() {
        let mut s = session();
        s.locals.insert("A".into(), "1".into());
        s.push_login(principal("root", 0), true);
        assert_eq!(s.cwd, PathBuf::from("/root"));
        assert!(s.locals.is_empty());
        assert_eq!(s.logged_in(), vec!["user", "root"]);
        assert_eq!(s.prompt_string(), "root@debian:~# ");

        assert!(s.pop_login());
        assert_eq!(s.user.username, "user");
        assert_eq!(s.cwd, PathBuf::from("/home/user"));
        assert_eq!(s.locals.get("A").map(String::as_str), Some("1"));
        assert!(!s.pop_login());
    }

    #[test]
    fn test_sudo_cache() {
        let mut s = session();
        assert!(!s.sudo_cached());
        s.remember_sudo();
        assert!(s.sudo_cached());
        s.push_login(principal("root", 0), false);
        assert!(!s.sudo_cached());
    }
}
