//! Cursor-to-statement resolution

use crate::types::StatementDescriptor;

/// Find the statement the user means at `cursor_offset` (in characters).
///
/// Inside a statement's text that statement wins. In the gap between two
/// statements (separator, whitespace, comments) the preceding statement is
/// chosen, so a cursor right after a terminating `;` still picks it up.
/// Before the first statement the first one is chosen. `descriptors` must be
/// in the order produced by [`crate::parser::parse`].
pub fn resolve(
    descriptors: &[StatementDescriptor],
    cursor_offset: usize,
) -> Option<&StatementDescriptor> {
    let after = descriptors.partition_point(|d| d.start_offset <= cursor_offset);
    match after.checked_sub(1) {
        Some(index) => descriptors.get(index),
        None => descriptors.first(),
    }
}
