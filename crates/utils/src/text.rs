pub fn truncate_to_char_boundary(content: &str, max_len: usize) -> &str {
    if content.len() <= max_len {
        return content;
    }

    let cutoff = content
        .char_indices()
        .map(|(idx, _)| idx)
        .chain(std::iter::once(content.len()))
        .take_while(|&idx| idx <= max_len)
        .last()
        .unwrap_or(0);

    debug_assert!(content.is_char_boundary(cutoff));
    &content[..cutoff]
}

/// Collapse captured process output into a single diagnostic string.
/// Prefers stderr; falls back to stdout when stderr is empty.
pub fn combine_output(stdout: &[u8], stderr: &[u8]) -> String {
    let stderr = String::from_utf8_lossy(stderr).trim().to_string();
    let stdout = String::from_utf8_lossy(stdout).trim().to_string();
    match (stdout.is_empty(), stderr.is_empty()) {
        (true, true) => "Command failed with no output".to_string(),
        (false, false) => format!("--- stderr\n{stderr}\n--- stdout\n{stdout}"),
        (false, true) => format!("--- stdout\n{stdout}"),
        (true, false) => format!("--- stderr\n{stderr}"),
    }
}
