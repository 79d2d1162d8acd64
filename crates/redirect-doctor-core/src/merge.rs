use crate::document::{ConfigDocument, DependentAssemblyEntry, SectionChild};
use crate::error::Result;
use crate::version::AssemblyVersion;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How a duplicate assembly name was settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub name: String,
    pub kept: AssemblyVersion,
    pub discarded: AssemblyVersion,
    /// `true` when the later entry replaced the one seen first.
    pub updated: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeReport {
    /// `dependentAssembly` entries in the original section.
    pub before: usize,
    /// `dependentAssembly` entries written back.
    pub after: usize,
    pub resolutions: Vec<Resolution>,
    /// Whether the rebuilt section differs from the text it replaced.
    pub changed: bool,
}

/// Winning entry per assembly name, ordered by ordinal name comparison.
#[derive(Debug, Default)]
pub struct MergedBindingTable {
    entries: BTreeMap<String, DependentAssemblyEntry>,
}

impl MergedBindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer an entry to the table. Returns how a clash was settled, or
    /// `None` when the name is new. Ties keep the entry seen first.
    pub fn offer(&mut self, candidate: DependentAssemblyEntry) -> Option<Resolution> {
        let Some(stored) = self.entries.get_mut(&candidate.name) else {
            self.entries.insert(candidate.name.clone(), candidate);
            return None;
        };

        tracing::info!(
            assembly = %candidate.name,
            "Reference already exists. Checking version..."
        );

        if candidate.new_version > stored.new_version {
            let resolution = Resolution {
                name: candidate.name.clone(),
                kept: candidate.new_version,
                discarded: stored.new_version,
                updated: true,
            };
            *stored = candidate;
            tracing::info!(
                assembly = %resolution.name,
                from = %resolution.discarded,
                to = %resolution.kept,
                "Version was newer. Binding updated."
            );
            Some(resolution)
        } else {
            tracing::info!(
                assembly = %candidate.name,
                kept = %stored.new_version,
                skipped = %candidate.new_version,
                "Version was the same or older. No update needed. Skipping."
            );
            Some(Resolution {
                name: candidate.name,
                kept: stored.new_version,
                discarded: candidate.new_version,
                updated: false,
            })
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&DependentAssemblyEntry> {
        self.entries.get(name)
    }

    /// Entries in ascending name order.
    pub fn iter(&self) -> impl Iterator<Item = &DependentAssemblyEntry> {
        self.entries.values()
    }
}

/// Deduplicate the document's `assemblyBinding` section in place.
///
/// The section is rebuilt from its opening tag, any non-`dependentAssembly`
/// children in their original order, then one entry per assembly name sorted
/// by name. On error the document is left as it was.
pub fn merge(document: &mut ConfigDocument) -> Result<MergeReport> {
    let section = document.binding_section()?;
    let before = section.entry_count();

    let mut table = MergedBindingTable::new();
    let mut passthrough = Vec::new();
    let mut resolutions = Vec::new();

    for child in &section.children {
        match child {
            SectionChild::Entry(entry) => {
                if let Some(resolution) = table.offer(entry.clone()) {
                    resolutions.push(resolution);
                }
            }
            SectionChild::Other(markup) => passthrough.push(markup.as_str()),
        }
    }

    let rendered = section.render(
        passthrough
            .iter()
            .copied()
            .chain(table.iter().map(|e| e.markup.as_str())),
    );
    let changed = document.as_str()[section.span.clone()] != rendered;
    if changed {
        document.replace_range(section.span.clone(), &rendered);
    }

    let report = MergeReport {
        before,
        after: table.len(),
        resolutions,
        changed,
    };
    tracing::debug!(
        before = report.before,
        after = report.after,
        changed,
        "Section rebuilt"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DoctorError;

    fn entry(name: &str, version: &str) -> String {
        format!(
            "<dependentAssembly><assemblyIdentity name=\"{name}\" publicKeyToken=\"b03f5f7f11d50a3a\" culture=\"neutral\" /><bindingRedirect oldVersion=\"0.0.0.0-{version}\" newVersion=\"{version}\" /></dependentAssembly>"
        )
    }

    fn config(entries: &[(&str, &str)]) -> String {
        let mut body = String::new();
        for (name, version) in entries {
            body.push_str("\n      ");
            body.push_str(&entry(name, version));
        }
        format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<configuration>\n  <runtime>\n    <assemblyBinding xmlns=\"urn:schemas-microsoft-com:asm.v1\">{body}\n    </assemblyBinding>\n  </runtime>\n</configuration>\n"
        )
    }

    fn merged(entries: &[(&str, &str)]) -> (ConfigDocument, MergeReport) {
        let mut doc = ConfigDocument::parse(config(entries)).unwrap();
        let report = merge(&mut doc).unwrap();
        (doc, report)
    }

    fn names_and_versions(doc: &ConfigDocument) -> Vec<(String, String)> {
        doc.binding_section()
            .unwrap()
            .children
            .into_iter()
            .filter_map(|c| match c {
                SectionChild::Entry(e) => Some((e.name, e.new_version.to_string())),
                SectionChild::Other(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_one_entry_per_name() {
        let (doc, _) = merged(&[
            ("A", "1.0.0.0"),
            ("B", "1.0.0.0"),
            ("A", "1.0.0.0"),
            ("B", "2.0.0.0"),
            ("A", "3.0.0.0"),
        ]);
        let entries = names_and_versions(&doc);
        assert_eq!(
            entries,
            vec![
                ("A".to_string(), "3.0.0.0".to_string()),
                ("B".to_string(), "2.0.0.0".to_string()),
            ]
        );
    }

    #[test]
    fn test_highest_version_wins_either_order() {
        for input in [
            [("X", "1.0.0.0"), ("X", "2.0.0.0")],
            [("X", "2.0.0.0"), ("X", "1.0.0.0")],
        ] {
            let (doc, _) = merged(&input);
            assert_eq!(
                names_and_versions(&doc),
                vec![("X".to_string(), "2.0.0.0".to_string())]
            );
        }
    }

    #[test]
    fn test_tie_keeps_first_seen_entry() {
        let first = "<dependentAssembly><assemblyIdentity name=\"X\" culture=\"neutral\" /><bindingRedirect oldVersion=\"0.0.0.0-5.0.0.0\" newVersion=\"5.0.0.0\" /></dependentAssembly>";
        let second = "<dependentAssembly><assemblyIdentity name=\"X\" culture=\"en-US\" /><bindingRedirect oldVersion=\"1.0.0.0-5.0.0.0\" newVersion=\"5.0.0.0\" /></dependentAssembly>";
        let xml = format!("<configuration><assemblyBinding>{first}{second}</assemblyBinding></configuration>");

        let mut doc = ConfigDocument::parse(xml).unwrap();
        let report = merge(&mut doc).unwrap();

        assert!(doc.as_str().contains(first));
        assert!(!doc.as_str().contains(second));
        assert_eq!(report.resolutions.len(), 1);
        assert!(!report.resolutions[0].updated);
    }

    #[test]
    fn test_lower_candidate_is_discarded() {
        let (_, report) = merged(&[("X", "4.2.0.0"), ("X", "4.1.9.9")]);
        assert_eq!(
            report.resolutions,
            vec![Resolution {
                name: "X".into(),
                kept: AssemblyVersion::new(4, 2, 0, 0),
                discarded: AssemblyVersion::new(4, 1, 9, 9),
                updated: false,
            }]
        );
    }

    #[test]
    fn test_numeric_comparison() {
        let (doc, _) = merged(&[("X", "10.0.0.0"), ("X", "9.0.0.0")]);
        assert_eq!(
            names_and_versions(&doc),
            vec![("X".to_string(), "10.0.0.0".to_string())]
        );
    }

    #[test]
    fn test_sorted_by_ordinal_name() {
        let (doc, _) = merged(&[
            ("System.Web.Mvc", "5.2.7.0"),
            ("Microsoft.Owin", "4.1.0.0"),
            ("antlr", "3.5.0.2"),
            ("System.Buffers", "4.0.3.0"),
        ]);
        let names: Vec<String> = names_and_versions(&doc).into_iter().map(|(n, _)| n).collect();
        // ordinal: uppercase sorts before lowercase
        assert_eq!(
            names,
            vec!["Microsoft.Owin", "System.Buffers", "System.Web.Mvc", "antlr"]
        );
    }

    #[test]
    fn test_merge_is_idempotent() {
        let (doc, _) = merged(&[("B", "1.0.0.0"), ("A", "2.0.0.0"), ("B", "1.5.0.0")]);
        let once = doc.as_str().to_string();

        let mut again = ConfigDocument::parse(once.clone()).unwrap();
        let report = merge(&mut again).unwrap();

        assert_eq!(again.as_str(), once);
        assert!(!report.changed);
        assert!(report.resolutions.is_empty());
    }

    #[test]
    fn test_counts_before_and_after() {
        let (_, report) = merged(&[
            ("A", "1.0.0.0"),
            ("B", "1.0.0.0"),
            ("C", "1.0.0.0"),
            ("A", "2.0.0.0"),
            ("C", "0.9.0.0"),
        ]);
        assert_eq!(report.before, 5);
        assert_eq!(report.after, 3);
        assert!(report.changed);
    }

    #[test]
    fn test_reorder_alone_counts_as_change() {
        let (doc, report) = merged(&[("B", "1.0.0.0"), ("A", "1.0.0.0")]);
        assert_eq!((report.before, report.after), (2, 2));
        assert!(report.resolutions.is_empty());
        assert!(report.changed);
        assert_ne!(doc.as_str(), config(&[("B", "1.0.0.0"), ("A", "1.0.0.0")]));

        let (_, report) = merged(&[("A", "1.0.0.0"), ("B", "1.0.0.0")]);
        assert!(!report.changed);
    }

    #[test]
    fn test_output_layout() {
        let (doc, _) = merged(&[("B", "1.0.0.0"), ("A", "1.0.0.0")]);
        let expected = format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<configuration>\n  <runtime>\n    <assemblyBinding xmlns=\"urn:schemas-microsoft-com:asm.v1\">\n      {}\n      {}\n    </assemblyBinding>\n  </runtime>\n</configuration>\n",
            entry("A", "1.0.0.0"),
            entry("B", "1.0.0.0")
        );
        assert_eq!(doc.as_str(), expected);
    }

    #[test]
    fn test_text_outside_section_preserved() {
        let xml = "<?xml version=\"1.0\"?>\r\n<!-- header -->\r\n<configuration>\r\n  <appSettings><add key=\"k\" value=\"v &amp; w\"/></appSettings>\r\n  <runtime><assemblyBinding><dependentAssembly><assemblyIdentity name=\"A\"/><bindingRedirect newVersion=\"1.0.0.0\"/></dependentAssembly></assemblyBinding></runtime>\r\n</configuration>\r\n";
        let mut doc = ConfigDocument::parse(xml).unwrap();
        merge(&mut doc).unwrap();
        assert_eq!(doc.as_str(), xml);
    }

    #[test]
    fn test_other_children_survive() {
        let xml = "<configuration><assemblyBinding><dependentAssembly><assemblyIdentity name=\"B\"/><bindingRedirect newVersion=\"1.0.0.0\"/></dependentAssembly><probing privatePath=\"lib\"/><dependentAssembly><assemblyIdentity name=\"A\"/><bindingRedirect newVersion=\"1.0.0.0\"/></dependentAssembly></assemblyBinding></configuration>";
        let mut doc = ConfigDocument::parse(xml).unwrap();
        let report = merge(&mut doc).unwrap();

        assert_eq!(report.before, 2);
        assert_eq!(report.after, 2);
        let out = doc.as_str();
        let probing = out.find("<probing").unwrap();
        let a = out.find("name=\"A\"").unwrap();
        let b = out.find("name=\"B\"").unwrap();
        assert!(probing < a && a < b, "{out}");
    }

    #[test]
    fn test_only_first_section_rewritten() {
        let xml = "<configuration><runtime><assemblyBinding><dependentAssembly><assemblyIdentity name=\"B\"/><bindingRedirect newVersion=\"1.0.0.0\"/></dependentAssembly><dependentAssembly><assemblyIdentity name=\"A\"/><bindingRedirect newVersion=\"1.0.0.0\"/></dependentAssembly></assemblyBinding></runtime><location path=\"x\"><runtime><assemblyBinding><dependentAssembly><assemblyIdentity name=\"Z\"/><bindingRedirect newVersion=\"1.0.0.0\"/></dependentAssembly><dependentAssembly><assemblyIdentity name=\"Z\"/><bindingRedirect newVersion=\"1.0.0.0\"/></dependentAssembly></assemblyBinding></runtime></location></configuration>";
        let mut doc = ConfigDocument::parse(xml).unwrap();
        let report = merge(&mut doc).unwrap();
        assert_eq!((report.before, report.after), (2, 2));
        assert_eq!(doc.as_str().matches("name=\"Z\"").count(), 2);
    }

    #[test]
    fn test_malformed_entry_leaves_document_untouched() {
        let xml = "<configuration><assemblyBinding><dependentAssembly><assemblyIdentity name=\"B\"/><bindingRedirect newVersion=\"1.0.0.0\"/></dependentAssembly><dependentAssembly><bindingRedirect newVersion=\"1.0.0.0\"/></dependentAssembly></assemblyBinding></configuration>";
        let mut doc = ConfigDocument::parse(xml).unwrap();
        let err = merge(&mut doc).unwrap_err();
        assert!(matches!(err, DoctorError::MalformedConfig { .. }));
        assert_eq!(doc.as_str(), xml);
    }

    #[test]
    fn test_missing_section_is_malformed() {
        let mut doc = ConfigDocument::parse("<configuration><appSettings/></configuration>").unwrap();
        let err = merge(&mut doc).unwrap_err();
        assert!(matches!(err, DoctorError::MalformedConfig { .. }));
    }

    #[test]
    fn test_empty_section() {
        let xml = "<configuration><assemblyBinding xmlns=\"urn:schemas-microsoft-com:asm.v1\">\n</assemblyBinding></configuration>";
        let mut doc = ConfigDocument::parse(xml).unwrap();
        let report = merge(&mut doc).unwrap();
        assert_eq!((report.before, report.after), (0, 0));
        assert_eq!(doc.as_str(), xml);
    }
}
