use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

pub const COLUMN_COUNT: usize = 25;

/// Header value the store uses to switch a column off for one sheet.
pub const PLACEHOLDER: &str = "-";

const COLUMN_NAMES: [&str; COLUMN_COUNT] = [
    "Data1", "Data2", "Data3", "Data4", "Data5", "Data6", "Data7", "Data8", "Data9", "Data10",
    "Data11", "Data12", "Data13", "Data14", "Data15", "Data16", "Data17", "Data18", "Data19",
    "Data20", "Data21", "Data22", "Data23", "Data24", "Data25",
];

/// Column identifiers of a grade sheet, in store order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ColumnId {
    Data1,
    Data2,
    Data3,
    Data4,
    Data5,
    Data6,
    Data7,
    Data8,
    Data9,
    Data10,
    Data11,
    Data12,
    Data13,
    Data14,
    Data15,
    Data16,
    Data17,
    Data18,
    Data19,
    Data20,
    Data21,
    Data22,
    Data23,
    Data24,
    Data25,
}

impl ColumnId {
    pub const ALL: [ColumnId; COLUMN_COUNT] = [
        ColumnId::Data1,
        ColumnId::Data2,
        ColumnId::Data3,
        ColumnId::Data4,
        ColumnId::Data5,
        ColumnId::Data6,
        ColumnId::Data7,
        ColumnId::Data8,
        ColumnId::Data9,
        ColumnId::Data10,
        ColumnId::Data11,
        ColumnId::Data12,
        ColumnId::Data13,
        ColumnId::Data14,
        ColumnId::Data15,
        ColumnId::Data16,
        ColumnId::Data17,
        ColumnId::Data18,
        ColumnId::Data19,
        ColumnId::Data20,
        ColumnId::Data21,
        ColumnId::Data22,
        ColumnId::Data23,
        ColumnId::Data24,
        ColumnId::Data25,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        COLUMN_NAMES[self.index()]
    }

    /// Accepts the store's key spelling, case-insensitively ("Data5", "data5").
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        COLUMN_NAMES
            .iter()
            .position(|name| name.eq_ignore_ascii_case(s))
            .map(|i| Self::ALL[i])
    }
}

impl fmt::Display for ColumnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ColumnId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ColumnId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        ColumnId::parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown column id: {}", raw)))
    }
}

/// Store cells arrive as strings, numbers or nulls depending on how the
/// sheet was typed in. Everything is kept as text.
pub fn cell_text(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

fn de_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let v = serde_json::Value::deserialize(deserializer)?;
    Ok(cell_text(&v))
}

/// One student's row (or the display-header row) of a sheet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowRecord {
    cells: [String; COLUMN_COUNT],
}

impl RowRecord {
    /// Returns `None` when `v` is not a JSON object. Unknown keys are ignored.
    pub fn from_json(v: &serde_json::Value) -> Option<Self> {
        let obj = v.as_object()?;
        let mut rec = RowRecord::default();
        for (key, value) in obj {
            if let Some(col) = ColumnId::parse(key) {
                rec.cells[col.index()] = cell_text(value);
            }
        }
        Some(rec)
    }

    /// Inverse of [`RowRecord::values`]; missing trailing values become blank.
    pub fn from_values<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut rec = RowRecord::default();
        for (slot, v) in rec.cells.iter_mut().zip(values) {
            *slot = v.into();
        }
        rec
    }

    pub fn get(&self, col: ColumnId) -> &str {
        &self.cells[col.index()]
    }

    pub fn set(&mut self, col: ColumnId, value: impl Into<String>) {
        self.cells[col.index()] = value.into();
    }

    /// All cells in column order, as the bulk update expects them.
    pub fn values(&self) -> Vec<String> {
        self.cells.to_vec()
    }

    pub fn is_placeholder(&self, col: ColumnId) -> bool {
        self.get(col) == PLACEHOLDER
    }
}

/// Header row plus data rows of one sheet, as read from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetRows {
    pub header: RowRecord,
    pub rows: Vec<RowRecord>,
}

impl SheetRows {
    /// `None` when the store returned nothing at all (not even a header row).
    pub fn from_records(mut records: Vec<RowRecord>) -> Option<Self> {
        if records.is_empty() {
            return None;
        }
        let header = records.remove(0);
        Some(SheetRows {
            header,
            rows: records,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetDescriptor {
    #[serde(deserialize_with = "de_text")]
    pub sheet_name: String,
    #[serde(default, deserialize_with = "de_text")]
    pub mapel: String,
    #[serde(default, deserialize_with = "de_text")]
    pub semester: String,
    #[serde(default, deserialize_with = "de_text")]
    pub kelas: String,
}

/// Learning objective ("TP") details from the `DataTP` lookup sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TpRecord {
    #[serde(default, deserialize_with = "de_text")]
    pub mapel: String,
    #[serde(default, deserialize_with = "de_text")]
    pub tp: String,
    #[serde(default, deserialize_with = "de_text")]
    pub bab: String,
    #[serde(default, deserialize_with = "de_text")]
    pub semester: String,
    #[serde(default, deserialize_with = "de_text")]
    pub kelas: String,
    #[serde(default, deserialize_with = "de_text")]
    pub rincian: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn column_ids_parse_case_insensitively() {
        assert_eq!(ColumnId::parse("Data5"), Some(ColumnId::Data5));
        assert_eq!(ColumnId::parse(" data25 "), Some(ColumnId::Data25));
        assert_eq!(ColumnId::parse("Data26"), None);
        assert_eq!(ColumnId::parse("Nama"), None);
        assert_eq!(ColumnId::Data12.as_str(), "Data12");
        assert_eq!(ColumnId::Data19.index() - ColumnId::Data5.index(), 14);
    }

    #[test]
    fn row_record_converts_store_cells_to_text() {
        let rec = RowRecord::from_json(&json!({
            "Data1": 1,
            "Data3": "Budi",
            "Data5": 87.5,
            "Data6": null,
            "Unrelated": "x"
        }))
        .expect("object");
        assert_eq!(rec.get(ColumnId::Data1), "1");
        assert_eq!(rec.get(ColumnId::Data3), "Budi");
        assert_eq!(rec.get(ColumnId::Data5), "87.5");
        assert_eq!(rec.get(ColumnId::Data6), "");
        assert_eq!(rec.get(ColumnId::Data25), "");
        assert_eq!(rec.values().len(), COLUMN_COUNT);

        assert!(RowRecord::from_json(&json!(["Data1"])).is_none());
    }

    #[test]
    fn placeholder_header_must_match_exactly() {
        let mut header = RowRecord::default();
        header.set(ColumnId::Data6, "-");
        header.set(ColumnId::Data7, " - ");
        header.set(ColumnId::Data8, "TP2");
        assert!(header.is_placeholder(ColumnId::Data6));
        assert!(!header.is_placeholder(ColumnId::Data7));
        assert!(!header.is_placeholder(ColumnId::Data8));
        assert!(!header.is_placeholder(ColumnId::Data9));
    }

    #[test]
    fn sheet_rows_split_header_from_data() {
        let header = RowRecord::from_values(["No", "NIS", "Nama"]);
        let row = RowRecord::from_values(["1", "1001", "Ani"]);
        let sheet = SheetRows::from_records(vec![header.clone(), row.clone()]).expect("rows");
        assert_eq!(sheet.header, header);
        assert_eq!(sheet.rows, vec![row]);
        assert!(SheetRows::from_records(Vec::new()).is_none());
    }

    #[test]
    fn sheet_descriptor_accepts_numeric_semester() {
        let d: SheetDescriptor = serde_json::from_value(json!({
            "sheetName": "MAPEL101",
            "mapel": "Matematika",
            "semester": 1,
            "kelas": "7A"
        }))
        .expect("descriptor");
        assert_eq!(d.semester, "1");
        assert_eq!(d.kelas, "7A");
    }
}
