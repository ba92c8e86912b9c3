use std::io::Write;

use crate::context::SharedWriter;

/// Render the debug line for one command: env overrides in the order they
/// were set, then the argv, all shell-quoted so the line is a valid
/// literal reproduction of the command.
pub(crate) fn render_line(envs: &[(String, String)], argv: &[String]) -> String {
    let mut line = String::new();
    for (name, value) in envs {
        line.push_str(name);
        line.push('=');
        line.push_str(&shell_words::quote(value));
        line.push(' ');
    }
    line.push_str(&shell_words::join(argv));
    line
}

/// Write one debug line to the sink. Tracing is best-effort; a failing
/// sink never fails the command.
pub(crate) fn emit(sink: &SharedWriter, line: &str) {
    let mut sink = sink.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let _ = writeln!(sink, "{}", line);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(words: &[&str]) -> Vec<String> {
        words.iter().map(|s| s.to_string()).collect()
    }

    fn envs(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_render_plain_command() {
        assert_eq!(render_line(&[], &argv(&["sort", "-u"])), "sort -u");
    }

    #[test]
    fn test_render_env_overrides_in_order() {
        let line = render_line(
            &envs(&[("LC_ALL", "C"), ("GOOS", "linux")]),
            &argv(&["go", "build"]),
        );
        assert_eq!(line, "LC_ALL=C GOOS=linux go build");
    }

    #[test]
    fn test_render_quotes_whitespace_and_metacharacters() {
        let line = render_line(
            &envs(&[("MSG", "two words")]),
            &argv(&["sh", "-c", "echo $MSG"]),
        );
        assert_eq!(line, "MSG='two words' sh -c 'echo $MSG'");
    }

    #[test]
    fn test_render_quotes_empty_value() {
        let line = render_line(&envs(&[("EMPTY", "")]), &argv(&["env"]));
        assert_eq!(line, "EMPTY='' env");
    }

    #[test]
    fn test_emit_appends_newline() {
        let buffer = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink: SharedWriter = buffer.clone();
        emit(&sink, "LC_ALL=C sort");
        let written = buffer.lock().unwrap();
        assert_eq!(String::from_utf8_lossy(&written), "LC_ALL=C sort\n");
    }
}
