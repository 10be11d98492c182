pub mod authors;
pub mod book_packs;
pub mod books;
pub mod dashboard;
pub mod orders;
pub mod shipping;
pub mod tags;
pub mod users;

use sea_orm::sea_query::{Expr, Func, LikeExpr, SimpleExpr};
use sea_orm::ColumnTrait;

const LIKE_ESCAPE: char = '\\';

/// `LIKE` pattern for a case-insensitive "contains" match; `%` and `_` in the term match literally
pub(crate) fn contains_pattern(term: &str) -> String {
    let mut pattern = String::from("%");
    for c in term.trim().to_lowercase().chars() {
        if matches!(c, '%' | '_' | LIKE_ESCAPE) {
            pattern.push(LIKE_ESCAPE);
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// `LOWER(col) LIKE '%term%' ESCAPE '\'`
pub(crate) fn ilike<C: ColumnTrait>(column: C, term: &str) -> SimpleExpr {
    Expr::expr(Func::lower(Expr::col(column)))
        .like(LikeExpr::new(contains_pattern(term)).escape(LIKE_ESCAPE))
}

/// `LOWER(col) = value`, value lower-cased here
pub(crate) fn eq_ignore_case<C: ColumnTrait>(column: C, value: &str) -> SimpleExpr {
    Expr::expr(Func::lower(Expr::col(column))).eq(value.trim().to_lowercase())
}

/// Zero-based offset for a one-based page number
pub(crate) fn page_offset(page: u64, per_page: u64) -> u64 {
    page.max(1).saturating_sub(1) * per_page
}

/// Trim a required text field, rejecting blank values
pub(crate) fn required_text(
    field: &str,
    value: &str,
) -> Result<String, crate::errors::ServiceError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(crate::errors::ServiceError::ValidationError(format!(
            "{field} must not be blank"
        )));
    }
    Ok(trimmed.to_string())
}

/// Trim an optional text field; blank becomes `None`
pub(crate) fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
