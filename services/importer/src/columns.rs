//! Source header labels -> canonical delivery fields.

/// Canonical fields filled straight from a labelled column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanonicalField {
    MetaCode,
    DeliveryCode,
    Description,
    Indicator,
    StartDate,
    EndDate,
    Status,
    Superintendency,
    Sector,
    Contact,
    UpdatedBy,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 11] = [
        Self::MetaCode,
        Self::DeliveryCode,
        Self::Description,
        Self::Indicator,
        Self::StartDate,
        Self::EndDate,
        Self::Status,
        Self::Superintendency,
        Self::Sector,
        Self::Contact,
        Self::UpdatedBy,
    ];

    /// Exact header label used by the monthly templates (case-sensitive).
    pub fn source_label(self) -> &'static str {
        match self {
            Self::MetaCode => "IDM",
            Self::DeliveryCode => "IDE",
            Self::Description => "ENTREGA",
            Self::Indicator => "INDICADOR",
            Self::StartDate => "DATA DE INÍCIO",
            Self::EndDate => "DATA DE TÉRMINO",
            Self::Status => "STATUS",
            Self::Superintendency => "SUPERINTENDÊNCIA",
            Self::Sector => "SETOR",
            Self::Contact => "INTERLOCUTOR",
            Self::UpdatedBy => "RESPONSÁVEL PELA ATUALIZAÇÃO",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL.into_iter().find(|f| f.source_label() == label)
    }
}

/// Column positions resolved against one sheet's header row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnMap {
    fields: Vec<(CanonicalField, usize)>,
    percent: Option<usize>,
}

impl ColumnMap {
    pub fn from_headers(headers: &[String]) -> Self {
        let mut fields: Vec<(CanonicalField, usize)> = Vec::new();
        for (idx, header) in headers.iter().enumerate() {
            if let Some(field) = CanonicalField::from_label(header) {
                if !fields.iter().any(|(f, _)| *f == field) {
                    fields.push((field, idx));
                }
            }
        }

        Self {
            fields,
            percent: headers.iter().position(|h| is_percent_header(h)),
        }
    }

    pub fn column(&self, field: CanonicalField) -> Option<usize> {
        self.fields
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, idx)| *idx)
    }

    pub fn percent_column(&self) -> Option<usize> {
        self.percent
    }

    /// Mapped fields in header order.
    pub fn fields(&self) -> impl Iterator<Item = (CanonicalField, usize)> + '_ {
        self.fields.iter().copied()
    }
}

/// Execution-percent column: contains `%` and EXEC or AGOSTO (any case).
///
/// AGOSTO only matches the August template's "% AGOSTO" header; other
/// monthly templates must label the column with EXEC.
fn is_percent_header(header: &str) -> bool {
    let upper = header.to_uppercase();
    header.contains('%') && (upper.contains("EXEC") || upper.contains("AGOSTO"))
}
