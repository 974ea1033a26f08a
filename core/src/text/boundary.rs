/// Characters that close a sentence, clause or line.
pub const BOUNDARY_CHARS: [char; 7] = ['.', '?', '!', '…', ':', ';', '\n'];

/// Returns true if `token` contains a boundary character anywhere.
pub fn is_boundary(token: &str) -> bool {
    token.contains(BOUNDARY_CHARS)
}

/// A token made only of line breaks (`"\n"`, `"\r\n"`, `"\n\n"`).
pub fn is_standalone_newline(token: &str) -> bool {
    !token.is_empty() && token.chars().all(|c| c == '\n' || c == '\r')
}
