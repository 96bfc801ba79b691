//! Cross-sheet "rekap": per-student scores across subjects and the
//! per-student report documents built from them.

use crate::model::{ColumnId, RowRecord, SheetDescriptor, SheetRows};
use crate::store::{StoreError, TabularStore};
use serde::Serialize;
use rayon::prelude::*;
use std::collections::HashMap;

const NAME_COLUMN: ColumnId = ColumnId::Data3;
const NIS_COLUMN: ColumnId = ColumnId::Data2;
/// Codes of the best-achieved and the weakest learning objective.
const STRENGTH_TP_COLUMN: ColumnId = ColumnId::Data24;
const IMPROVE_TP_COLUMN: ColumnId = ColumnId::Data25;

#[derive(Debug, Clone, Default)]
pub struct RekapFilter {
    pub kelas: Option<String>,
    pub semester: Option<String>,
}

impl RekapFilter {
    pub fn matches(&self, d: &SheetDescriptor) -> bool {
        let eq = |want: &Option<String>, have: &str| {
            want.as_deref()
                .map(|w| w.trim().eq_ignore_ascii_case(have.trim()))
                .unwrap_or(true)
        };
        eq(&self.kelas, &d.kelas) && eq(&self.semester, &d.semester)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectScore {
    pub mapel: String,
    pub sheet: String,
    pub score: Option<f64>,
    #[serde(skip)]
    pub strength_tp: String,
    #[serde(skip)]
    pub improve_tp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRekap {
    pub name: String,
    pub nis: String,
    pub kelas: String,
    pub semester: String,
    pub scores: Vec<SubjectScore>,
    pub mean: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Rekap {
    pub subjects: Vec<String>,
    pub students: Vec<StudentRekap>,
}

/// Grade cells are typed by hand: blanks, placeholders and comma decimals
/// all occur.
pub fn parse_score(text: &str) -> Option<f64> {
    let t = text.trim();
    if t.is_empty() || t == crate::model::PLACEHOLDER {
        return None;
    }
    t.replace(',', ".").parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn mean<I>(scores: I) -> Option<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    let (sum, n) = scores
        .into_iter()
        .flatten()
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        None
    } else {
        Some(sum / n as f64)
    }
}

pub fn round_2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Fetches every sheet concurrently and waits for all of them. Any single
/// failure fails the whole fetch; results keep the order of `sheets`.
pub fn fetch_all(
    store: &dyn TabularStore,
    sheets: &[SheetDescriptor],
) -> Result<Vec<(SheetDescriptor, SheetRows)>, StoreError> {
    // `collect` keeps input order and stops at the first failed sheet.
    sheets
        .par_iter()
        .map(|d| {
            let records = store.fetch_rows(&d.sheet_name).map_err(|e| {
                log::warn!("rekap fetch of {} failed: {}", d.sheet_name, e);
                e
            })?;
            let rows = SheetRows::from_records(records).unwrap_or(SheetRows {
                header: RowRecord::default(),
                rows: Vec::new(),
            });
            Ok((d.clone(), rows))
        })
        .collect::<Result<Vec<_>, StoreError>>()
}

/// Groups rows by student name (first appearance order) and scores each
/// subject from `score_column`.
pub fn aggregate(fetched: &[(SheetDescriptor, SheetRows)], score_column: ColumnId) -> Rekap {
    let mut subjects: Vec<String> = Vec::new();
    let mut students: Vec<StudentRekap> = Vec::new();
    let mut by_name: HashMap<String, usize> = HashMap::new();

    for (d, sheet) in fetched {
        if !subjects.contains(&d.mapel) {
            subjects.push(d.mapel.clone());
        }
        for row in &sheet.rows {
            let name = row.get(NAME_COLUMN).trim();
            if name.is_empty() {
                continue;
            }
            let idx = *by_name.entry(name.to_string()).or_insert_with(|| {
                students.push(StudentRekap {
                    name: name.to_string(),
                    nis: row.get(NIS_COLUMN).trim().to_string(),
                    kelas: d.kelas.clone(),
                    semester: d.semester.clone(),
                    scores: Vec::new(),
                    mean: None,
                });
                students.len() - 1
            });
            let student = &mut students[idx];
            if student.scores.iter().any(|s| s.mapel == d.mapel) {
                continue;
            }
            student.scores.push(SubjectScore {
                mapel: d.mapel.clone(),
                sheet: d.sheet_name.clone(),
                score: parse_score(row.get(score_column)),
                strength_tp: row.get(STRENGTH_TP_COLUMN).trim().to_string(),
                improve_tp: row.get(IMPROVE_TP_COLUMN).trim().to_string(),
            });
        }
    }

    for s in &mut students {
        s.mean = mean(s.scores.iter().map(|x| x.score)).map(round_2);
    }

    Rekap { subjects, students }
}

pub fn build_rekap(
    store: &dyn TabularStore,
    sheets: &[SheetDescriptor],
    filter: &RekapFilter,
    score_column: ColumnId,
) -> Result<Rekap, StoreError> {
    let selected: Vec<SheetDescriptor> = sheets
        .iter()
        .filter(|d| filter.matches(d))
        .cloned()
        .collect();
    if selected.is_empty() {
        return Err(StoreError::NoData("no sheets match the filter".into()));
    }
    log::info!("building rekap from {} sheet(s)", selected.len());
    let fetched = fetch_all(store, &selected)?;
    Ok(aggregate(&fetched, score_column))
}

/// `rincian` texts keyed by (tp code, mapel).
pub type NarrativeIndex = HashMap<(String, String), String>;

/// Looks up every TP code the rekap references. Any lookup failure fails
/// the whole index so callers can drop narratives consistently.
pub fn collect_narratives(
    store: &dyn TabularStore,
    rekap: &Rekap,
) -> Result<NarrativeIndex, StoreError> {
    let mut index = NarrativeIndex::new();
    let mut seen: Vec<(String, String)> = Vec::new();
    for student in &rekap.students {
        for s in &student.scores {
            for code in [&s.strength_tp, &s.improve_tp] {
                if code.is_empty() || code == crate::model::PLACEHOLDER {
                    continue;
                }
                let key = (code.clone(), s.mapel.clone());
                if seen.contains(&key) {
                    continue;
                }
                seen.push(key.clone());
                if let Some(rec) = store.lookup_tp(code, &s.mapel)? {
                    index.insert(key, rec.rincian);
                }
            }
        }
    }
    Ok(index)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreLine {
    pub no: usize,
    pub mapel: String,
    pub score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NarrativeEntry {
    pub mapel: String,
    pub strength: Option<String>,
    pub improvement: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Block {
    Title {
        text: String,
    },
    Identity {
        name: String,
        nis: String,
        kelas: String,
        semester: String,
    },
    ScoreTable {
        rows: Vec<ScoreLine>,
        continued: bool,
    },
    Summary {
        mean: Option<f64>,
    },
    Narrative {
        entries: Vec<NarrativeEntry>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPage {
    pub number: usize,
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentDocument {
    pub student: String,
    pub page_count: usize,
    pub pages: Vec<DocumentPage>,
    pub generated_at: String,
}

#[derive(Debug, Clone)]
pub struct DocumentOptions {
    pub title: String,
    pub rows_per_page: usize,
    pub generated_at: String,
}

fn narrative_entries(student: &StudentRekap, index: &NarrativeIndex) -> Vec<NarrativeEntry> {
    let text = |code: &str, mapel: &str| index.get(&(code.to_string(), mapel.to_string())).cloned();
    student
        .scores
        .iter()
        .map(|s| NarrativeEntry {
            mapel: s.mapel.clone(),
            strength: text(&s.strength_tp, &s.mapel),
            improvement: text(&s.improve_tp, &s.mapel),
        })
        .filter(|e| e.strength.is_some() || e.improvement.is_some())
        .collect()
}

/// Lays one student's report out over pages. `narratives = None` omits the
/// narrative section entirely.
pub fn student_document(
    student: &StudentRekap,
    narratives: Option<&NarrativeIndex>,
    opts: &DocumentOptions,
) -> StudentDocument {
    let lines: Vec<ScoreLine> = student
        .scores
        .iter()
        .enumerate()
        .map(|(i, s)| ScoreLine {
            no: i + 1,
            mapel: s.mapel.clone(),
            score: s.score.map(round_2),
        })
        .collect();

    let per_page = opts.rows_per_page.max(1);
    let mut chunks: Vec<Vec<ScoreLine>> = lines.chunks(per_page).map(|c| c.to_vec()).collect();
    if chunks.is_empty() {
        chunks.push(Vec::new());
    }

    let mut pages: Vec<DocumentPage> = Vec::with_capacity(chunks.len());
    for (i, rows) in chunks.into_iter().enumerate() {
        let mut blocks = Vec::new();
        if i == 0 {
            blocks.push(Block::Title {
                text: opts.title.clone(),
            });
            blocks.push(Block::Identity {
                name: student.name.clone(),
                nis: student.nis.clone(),
                kelas: student.kelas.clone(),
                semester: student.semester.clone(),
            });
        }
        blocks.push(Block::ScoreTable {
            rows,
            continued: i > 0,
        });
        pages.push(DocumentPage {
            number: i + 1,
            blocks,
        });
    }

    if let Some(last) = pages.last_mut() {
        last.blocks.push(Block::Summary { mean: student.mean });
        if let Some(index) = narratives {
            let entries = narrative_entries(student, index);
            if !entries.is_empty() {
                last.blocks.push(Block::Narrative { entries });
            }
        }
    }

    StudentDocument {
        student: student.name.clone(),
        page_count: pages.len(),
        pages,
        generated_at: opts.generated_at.clone(),
    }
}
