//! Deciding what a resolved placeholder does to its cell

use crate::data::DataValue;
use crate::placeholder::{Placeholder, PlaceholderKind, extract_placeholders};

/// How each element of a table array is rendered into its cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CellRender {
    Value,
    Image,
    ImageInCell,
}

/// The action for one placeholder, decided once from its type and the value's shape
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Substitution<'d> {
    /// Whole cell replaced by a single value
    Scalar(&'d DataValue),
    /// Token replaced inside a longer string
    PartialScalar(&'d DataValue),
    /// One cell per element across the row
    ColumnArray(&'d [DataValue]),
    /// One row per element down the sheet
    TableArray {
        rows: &'d [DataValue],
        render: CellRender,
    },
    Image(&'d DataValue),
    ImageInCell(&'d DataValue),
}

/// Value bound to the placeholder's name (and key path, except for tables)
pub(crate) fn lookup<'d>(placeholder: &Placeholder, data: &'d DataValue) -> Option<&'d DataValue> {
    let value = data.get(&placeholder.name)?;
    let value = match (&placeholder.key, placeholder.kind) {
        (Some(key), kind) if kind != PlaceholderKind::Table => value.lookup_path(key)?,
        _ => value,
    };
    (!value.is_null()).then_some(value)
}

impl<'d> Substitution<'d> {
    /// `None` when the name has no value; the placeholder is then left as written
    pub(crate) fn resolve(placeholder: &Placeholder, data: &'d DataValue) -> Option<Self> {
        let value = lookup(placeholder, data)?;
        if !placeholder.full {
            return Some(Substitution::PartialScalar(value));
        }
        Some(match (placeholder.kind, value) {
            (PlaceholderKind::Table, DataValue::Array(rows)) => Substitution::TableArray {
                rows,
                render: if placeholder.sub_type_is("image") {
                    CellRender::Image
                } else if placeholder.sub_type_is("imageincell") {
                    CellRender::ImageInCell
                } else {
                    CellRender::Value
                },
            },
            (PlaceholderKind::Normal, DataValue::Array(items)) => Substitution::ColumnArray(items),
            (PlaceholderKind::Image, value) => Substitution::Image(value),
            (PlaceholderKind::ImageInCell, value) => Substitution::ImageInCell(value),
            (_, value) => Substitution::Scalar(value),
        })
    }
}

/// Substitute normal placeholders in free text (table headers, hyperlink targets).
/// `None` when nothing was replaced.
pub(crate) fn render_text(text: &str, data: &DataValue) -> Option<String> {
    let mut rendered = text.to_string();
    let mut changed = false;
    for placeholder in extract_placeholders(text) {
        if placeholder.kind != PlaceholderKind::Normal {
            continue;
        }
        let Some(value) = lookup(&placeholder, data) else {
            continue;
        };
        rendered = rendered.replacen(&placeholder.placeholder, &value.stringify(), 1);
        changed = true;
    }
    changed.then_some(rendered)
}
