use grievance_common::SourceKind;
use serde::Serialize;

/// Counts from one source's scrape cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceSummary {
    pub name: String,
    pub kind: SourceKind,
    pub pages: u32,
    pub created: u32,
    pub updated: u32,
    pub duplicates: u32,
    /// Records dropped by the normalizer.
    pub rejected: u32,
    /// Records that could not be persisted.
    pub failed: u32,
    /// Set when the cycle stopped early on a source or store failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub cancelled: bool,
}

impl SourceSummary {
    pub fn new(name: impl Into<String>, kind: SourceKind) -> Self {
        Self {
            name: name.into(),
            kind,
            pages: 0,
            created: 0,
            updated: 0,
            duplicates: 0,
            rejected: 0,
            failed: 0,
            error: None,
            cancelled: false,
        }
    }

    pub fn processed(&self) -> u32 {
        self.created + self.updated + self.duplicates + self.rejected + self.failed
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleSummary {
    pub sources: Vec<SourceSummary>,
}

impl CycleSummary {
    pub fn source(&self, name: &str) -> Option<&SourceSummary> {
        self.sources.iter().find(|s| s.name.eq_ignore_ascii_case(name))
    }

    pub fn created(&self) -> u32 {
        self.sources.iter().map(|s| s.created).sum()
    }

    pub fn updated(&self) -> u32 {
        self.sources.iter().map(|s| s.updated).sum()
    }

    pub fn duplicates(&self) -> u32 {
        self.sources.iter().map(|s| s.duplicates).sum()
    }

    pub fn rejected(&self) -> u32 {
        self.sources.iter().map(|s| s.rejected).sum()
    }

    pub fn failed(&self) -> u32 {
        self.sources.iter().map(|s| s.failed).sum()
    }

    pub fn failed_sources(&self) -> usize {
        self.sources.iter().filter(|s| !s.succeeded()).count()
    }
}

impl std::fmt::Display for CycleSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Scrape Cycle Complete ===")?;
        writeln!(f, "Sources:     {}", self.sources.len())?;
        writeln!(f, "Failed:      {}", self.failed_sources())?;
        writeln!(f, "Created:     {}", self.created())?;
        writeln!(f, "Updated:     {}", self.updated())?;
        writeln!(f, "Duplicates:  {}", self.duplicates())?;
        writeln!(f, "Rejected:    {}", self.rejected())?;
        writeln!(f, "Not stored:  {}", self.failed())?;
        writeln!(f, "\nBy source:")?;
        for s in &self.sources {
            write!(
                f,
                "  {} ({}): {} pages, +{} new, {} updated, {} dup, {} rejected, {} failed",
                s.name, s.kind, s.pages, s.created, s.updated, s.duplicates, s.rejected, s.failed
            )?;
            if s.cancelled {
                write!(f, " [cancelled]")?;
            }
            if let Some(err) = &s.error {
                write!(f, " [error: {err}]")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_sum_across_sources() {
        let mut a = SourceSummary::new("MCD", SourceKind::MunicipalityScrape);
        a.created = 2;
        a.rejected = 1;
        let mut b = SourceSummary::new("social", SourceKind::SocialScrape);
        b.updated = 3;
        b.error = Some("boom".into());
        let cycle = CycleSummary {
            sources: vec![a, b],
        };
        assert_eq!(cycle.created(), 2);
        assert_eq!(cycle.updated(), 3);
        assert_eq!(cycle.failed_sources(), 1);
        assert_eq!(cycle.source("SOCIAL").map(|s| s.processed()), Some(3));

        let text = cycle.to_string();
        assert!(text.contains("=== Scrape Cycle Complete ==="));
        assert!(text.contains("[error: boom]"));
    }
}
