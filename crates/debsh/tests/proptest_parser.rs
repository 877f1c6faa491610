//! Property-based tests for the lexer and line execution
//!
//! Arbitrary input must never panic the shell or leave it unusable.

use debsh::{Shell, tokenize};
use proptest::prelude::*;

mod strategies {
    use proptest::prelude::*;

    pub fn arbitrary_line() -> impl Strategy<Value = String> {
        prop::string::string_regex(".{0,80}").unwrap()
    }

    pub fn word() -> impl Strategy<Value = String> {
        prop::string::string_regex("[a-zA-Z0-9_.-]{1,20}").unwrap()
    }

    pub fn shell_line() -> impl Strategy<Value = String> {
        let command = prop_oneof![
            Just("echo"),
            Just("cat"),
            Just("ls"),
            Just("mkdir"),
            Just("touch"),
            Just("rm"),
            Just("chmod"),
            Just("id"),
        ];
        (
            command,
            prop::collection::vec(word(), 0..4),
            prop::option::of(word()),
        )
            .prop_map(|(cmd, args, sink)| {
                let mut line = format!("{cmd} {}", args.join(" "));
                if let Some(target) = sink {
                    line.push_str(&format!(" > {target}"));
                }
                line
            })
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn tokenize_never_panics(line in strategies::arbitrary_line()) {
        let _ = tokenize(&line);
    }

    #[test]
    fn plain_words_tokenize_verbatim(words in prop::collection::vec(strategies::word(), 1..6)) {
        let line = words.join(" ");
        prop_assert_eq!(tokenize(&line).unwrap(), words);
    }

    #[test]
    fn single_quotes_preserve_content(text in "[a-zA-Z0-9 $*{},|<>]{1,30}") {
        let line = format!("echo '{text}'");
        prop_assert_eq!(tokenize(&line).unwrap(), vec!["echo".to_string(), text]);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn shell_survives_arbitrary_lines(lines in prop::collection::vec(
        prop_oneof![strategies::arbitrary_line(), strategies::shell_line()],
        1..6,
    )) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let mut shell = Shell::new().await.unwrap();
            for line in &lines {
                let _ = shell.exec(line).await;
                shell.cancel_prompt();
            }
            let result = shell.exec("whoami").await.unwrap();
            assert_eq!(result.stdout, "user\n");
        });
    }
}
