// Column registry of the data dictionary and the display rules for its values.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub label: &'static str,
    pub width: u16,
}

pub const COLUMNS: [ColumnDef; 11] = [
    ColumnDef { name: "fieldName", label: "Field Name", width: 34 },
    ColumnDef { name: "internalFieldName", label: "Internal FieldName", width: 34 },
    ColumnDef { name: "dataType", label: "Data Type", width: 12 },
    ColumnDef { name: "indexOnly", label: "Index Only", width: 12 },
    ColumnDef { name: "forwardIndexed", label: "Forward Index", width: 13 },
    ColumnDef { name: "reverseIndexed", label: "Reverse Index", width: 13 },
    ColumnDef { name: "normalized", label: "Normalized", width: 12 },
    ColumnDef { name: "Types", label: "Types", width: 14 },
    ColumnDef { name: "tokenized", label: "Tokenized", width: 12 },
    ColumnDef { name: "Descriptions", label: "Description", width: 26 },
    ColumnDef { name: "lastUpdated", label: "Last Updated", width: 15 },
];

pub fn column_def(name: &str) -> Option<&'static ColumnDef> {
    COLUMNS.iter().find(|c| c.name == name)
}

pub fn column_label(name: &str) -> &str {
    column_def(name).map(|c| c.label).unwrap_or(name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// Text shown next to the filter when the table is sorted.
pub fn sort_info(label: &str, direction: SortDirection) -> String {
    match direction {
        SortDirection::Ascending => format!("{label} in ascending order:"),
        SortDirection::Descending => format!("{label} in descending order:"),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Truncation {
    FieldName,
    Types,
    Descriptions,
    CopyPaste,
    None,
}

impl Truncation {
    pub fn for_column(name: &str) -> Self {
        match name {
            "fieldName" | "internalFieldName" => Truncation::FieldName,
            "Types" => Truncation::Types,
            "Descriptions" => Truncation::Descriptions,
            _ => Truncation::None,
        }
    }

    // (limit, kept chars)
    fn bounds(self) -> Option<(usize, usize)> {
        match self {
            Truncation::FieldName => Some((32, 30)),
            Truncation::Types => Some((14, 9)),
            Truncation::Descriptions => Some((24, 22)),
            Truncation::CopyPaste => Some((42, 40)),
            Truncation::None => None,
        }
    }
}

/// Null cells render as empty text.
pub fn parse_val(value: Option<&str>) -> &str {
    value.unwrap_or("")
}

pub fn max_substring(value: &str, rule: Truncation) -> String {
    match rule.bounds() {
        Some((limit, keep)) if value.chars().count() > limit => {
            let mut out: String = value.chars().take(keep).collect();
            out.push_str(" ...");
            out
        }
        _ => value.to_string(),
    }
}
