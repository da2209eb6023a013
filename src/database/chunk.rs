//! Placeholder-bounded row chunking
//!
//! A batched statement binds `fields_per_row` placeholders per row, and
//! the driver caps the total per round trip. Splitting happens up front so
//! one oversized flush can never produce an unexecutable statement.

/// Rows per statement for a given placeholder budget.
pub fn rows_per_statement(max_placeholders: usize, fields_per_row: usize) -> usize {
    debug_assert!(fields_per_row > 0);
    (max_placeholders / fields_per_row).max(1)
}

/// Split `rows` into ordered chunks that each fit the placeholder budget.
/// Concatenating the chunks reproduces `rows` exactly.
pub fn chunk_rows<T>(
    rows: &[T],
    max_placeholders: usize,
    fields_per_row: usize,
) -> std::slice::Chunks<'_, T> {
    rows.chunks(rows_per_statement(max_placeholders, fields_per_row))
}
