//! Plain-text imports: a roster with one name per line, and a meeting log
//! with one `Left,Right` pair per line.

/// Names from a roster listing. A first line mentioning "name" is treated as
/// a header; surrounding quotes and blank lines are dropped.
pub fn parse_roster(text: &str) -> Vec<String> {
    text.lines()
        .enumerate()
        .filter(|(i, line)| !(*i == 0 && line.to_lowercase().contains("name")))
        .map(|(_, line)| strip_quotes(line.trim()).trim().to_owned())
        .filter(|name| !name.is_empty())
        .collect()
}

/// Pairs from a meeting log. The `Left,Right` header is skipped, handles may
/// carry a leading `@`, and lines without two names are ignored.
pub fn parse_history(text: &str) -> Vec<(String, String)> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.eq_ignore_ascii_case("left,right"))
        .filter_map(|line| {
            let (left, right) = line.split_once(',')?;
            let left = clean_handle(left);
            let right = clean_handle(right);
            if left.is_empty() || right.is_empty() {
                None
            } else {
                Some((left.to_owned(), right.to_owned()))
            }
        })
        .collect()
}

const QUOTES: &[char] = &['"', '\''];

fn strip_quotes(s: &str) -> &str {
    let s = s.strip_prefix(QUOTES).unwrap_or(s);
    s.strip_suffix(QUOTES).unwrap_or(s)
}

fn clean_handle(s: &str) -> &str {
    let s = strip_quotes(s.trim());
    s.strip_prefix('@').unwrap_or(s).trim()
}
