//! Spreadsheet-style node labels.
//!
//! Labels are assigned by declaration index: `A`..`Z`, then `AA`, `AB`, ...
//! They appear in the audit trail and prefix column names when two tables
//! are merged.

/// Label for the node at `index` (zero-based)
#[must_use]
pub fn node_label(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(char::from(b'A' + rem as u8));
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}
