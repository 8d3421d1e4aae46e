//! Row schema for gene-based summary statistics.
//!
//! Fields are declared explicitly with their accepted source columns, and a
//! check returns every violation in the row instead of stopping at the first.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use csv::{ReaderBuilder, StringRecord};
use serde::Serialize;

use crate::error::{FixtureError, RowViolations, Violation};
use crate::fs_util;

/// Anything that can look up a column value by name.
pub trait RowSource {
    fn value(&self, column: &str) -> Option<&str>;
}

impl RowSource for HashMap<String, String> {
    fn value(&self, column: &str) -> Option<&str> {
        self.get(column).map(String::as_str)
    }
}

impl RowSource for BTreeMap<String, String> {
    fn value(&self, column: &str) -> Option<&str> {
        self.get(column).map(String::as_str)
    }
}

impl RowSource for HashMap<&str, &str> {
    fn value(&self, column: &str) -> Option<&str> {
        self.get(column).copied()
    }
}

/// A data record paired with its file's header.
pub struct HeaderedRecord<'a> {
    pub headers: &'a StringRecord,
    pub record: &'a StringRecord,
}

impl RowSource for HeaderedRecord<'_> {
    fn value(&self, column: &str) -> Option<&str> {
        let index = self.headers.iter().position(|h| h == column)?;
        self.record.get(index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    PositiveInteger,
    /// A positive number no greater than 1.
    Probability,
}

impl FieldKind {
    fn constraint(self) -> &'static str {
        match self {
            FieldKind::Text => "a string",
            FieldKind::PositiveInteger => "a positive integer",
            FieldKind::Probability => "a number in (0, 1]",
        }
    }

    fn accepts(self, raw: &str) -> bool {
        match self {
            FieldKind::Text => true,
            FieldKind::PositiveInteger => parse_positive_integer(raw).is_some(),
            FieldKind::Probability => parse_probability(raw).is_some(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: &'static str,
    pub aliases: Vec<&'static str>,
    pub kind: FieldKind,
    pub description: &'static str,
}

impl FieldSpec {
    fn lookup<'r, R: RowSource + ?Sized>(&self, row: &'r R) -> Option<&'r str> {
        self.aliases.iter().find_map(|alias| row.value(alias))
    }

    fn missing_constraint(&self) -> String {
        format!(
            "{} in column {}",
            self.kind.constraint(),
            self.aliases.join(" or ")
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct RowSchema {
    fields: Vec<FieldSpec>,
}

impl RowSchema {
    pub fn builder() -> RowSchemaBuilder {
        RowSchemaBuilder::default()
    }

    /// A row of a gene-based summary statistics file.
    pub fn gene_row() -> Self {
        Self::builder()
            .field("name", &["Name", "gene_name"], FieldKind::Text, "Gene name")
            .field("chromosome", &["chromosome"], FieldKind::Text, "Chromosome name")
            .field(
                "position",
                &["base_pair_location"],
                FieldKind::PositiveInteger,
                "Base pair position",
            )
            .field(
                "p_value",
                &["p_value"],
                FieldKind::Probability,
                "p-value of GWAS association",
            )
            .build()
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn check<R: RowSource + ?Sized>(&self, row: &R) -> Vec<Violation> {
        let mut violations = Vec::new();
        for field in &self.fields {
            match field.lookup(row) {
                None => violations.push(Violation {
                    field: field.name,
                    constraint: field.missing_constraint(),
                    actual: None,
                }),
                Some(raw) if !field.kind.accepts(raw) => violations.push(Violation {
                    field: field.name,
                    constraint: field.kind.constraint().to_string(),
                    actual: Some(raw.to_string()),
                }),
                Some(_) => {}
            }
        }
        violations
    }

    pub fn validate<R: RowSource + ?Sized>(&self, row: &R) -> Result<(), FixtureError> {
        let violations = self.check(row);
        if violations.is_empty() {
            Ok(())
        } else {
            Err(FixtureError::RowValidation(RowViolations {
                line: None,
                violations,
            }))
        }
    }
}

#[derive(Debug, Default)]
pub struct RowSchemaBuilder {
    fields: Vec<FieldSpec>,
}

impl RowSchemaBuilder {
    pub fn field(
        mut self,
        name: &'static str,
        aliases: &[&'static str],
        kind: FieldKind,
        description: &'static str,
    ) -> Self {
        self.fields.push(FieldSpec {
            name,
            aliases: aliases.to_vec(),
            kind,
            description,
        });
        self
    }

    pub fn build(self) -> RowSchema {
        RowSchema {
            fields: self.fields,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneRow {
    pub name: String,
    pub chromosome: String,
    pub position: u64,
    pub p_value: f64,
}

impl GeneRow {
    pub fn from_row<R: RowSource + ?Sized>(row: &R) -> Result<Self, FixtureError> {
        let schema = RowSchema::gene_row();
        schema.validate(row)?;
        let text = |name: &str| {
            schema
                .fields()
                .iter()
                .find(|f| f.name == name)
                .and_then(|f| f.lookup(row))
                .unwrap_or_default()
        };
        // validate() has already checked every field, so these parse.
        Ok(Self {
            name: text("name").to_string(),
            chromosome: text("chromosome").to_string(),
            position: parse_positive_integer(text("position")).unwrap_or_default(),
            p_value: parse_probability(text("p_value")).unwrap_or_default(),
        })
    }
}

fn parse_positive_integer(raw: &str) -> Option<u64> {
    raw.trim().parse::<u64>().ok().filter(|n| *n > 0)
}

fn parse_probability(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|p| p.is_finite() && *p > 0.0 && *p <= 1.0)
}

#[derive(Debug, Clone, Serialize)]
pub struct FileValidation {
    pub path: String,
    pub rows: usize,
}

/// Validate every data row of a (gzipped or plain) TSV file.
pub fn validate_sumstat_file(path: &Path) -> Result<FileValidation, FixtureError> {
    let schema = RowSchema::gene_row();
    let reader = fs_util::open_maybe_gzip(path)?;
    let parse_err = |err: csv::Error| FixtureError::SourceParse {
        source_path: path.display().to_string(),
        message: err.to_string(),
    };
    let mut csv_reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .quoting(false)
        .from_reader(reader);
    let headers = csv_reader.headers().map_err(parse_err)?.clone();

    let mut rows = 0usize;
    for record in csv_reader.records() {
        let record = record.map_err(parse_err)?;
        let row = HeaderedRecord {
            headers: &headers,
            record: &record,
        };
        let violations = schema.check(&row);
        if !violations.is_empty() {
            let line = record.position().map(|p| p.line() as usize);
            return Err(FixtureError::RowValidation(RowViolations { line, violations }));
        }
        rows += 1;
    }
    Ok(FileValidation {
        path: path.display().to_string(),
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gene_row_fields() {
        let schema = RowSchema::gene_row();
        let names: Vec<_> = schema.fields().iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["name", "chromosome", "position", "p_value"]);
        assert_eq!(schema.fields()[0].aliases, vec!["Name", "gene_name"]);
    }

    #[test]
    fn integer_parsing() {
        assert_eq!(parse_positive_integer("12345"), Some(12345));
        assert_eq!(parse_positive_integer(" 7 "), Some(7));
        assert_eq!(parse_positive_integer("0"), None);
        assert_eq!(parse_positive_integer("-3"), None);
        assert_eq!(parse_positive_integer("1.5"), None);
    }

    #[test]
    fn probability_parsing() {
        assert_eq!(parse_probability("1"), Some(1.0));
        assert_eq!(parse_probability("3.2e-12"), Some(3.2e-12));
        assert_eq!(parse_probability("0"), None);
        assert_eq!(parse_probability("NaN"), None);
        assert_eq!(parse_probability("1.0000001"), None);
    }

    #[test]
    fn headered_record_lookup() {
        let headers = StringRecord::from(vec!["gene_name", "chromosome"]);
        let record = StringRecord::from(vec!["BRCA1", "17"]);
        let row = HeaderedRecord {
            headers: &headers,
            record: &record,
        };
        assert_eq!(row.value("gene_name"), Some("BRCA1"));
        assert_eq!(row.value("p_value"), None);
    }
}
