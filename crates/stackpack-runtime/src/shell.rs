/// POSIX single-quote a string for interpolation into a `sh -c` command.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}
