//! Concept library — units of learning material with reference answers.
//!
//! Loaded once at startup from a JSON file of the shape
//! `{"concepts": [{"name", "golden_answer"}, ...]}`. When the file is
//! missing or invalid, the study's three stock concepts are used and
//! written back best-effort so researchers can edit them on disk.

use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Concept {
    pub name: String,
    /// Reference ("golden") explanation used for feedback generation and
    /// similarity scoring.
    pub golden_answer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConceptsFile {
    concepts: Vec<Concept>,
}

#[derive(Debug, Clone)]
pub struct ConceptLibrary {
    concepts: Vec<Concept>,
}

impl ConceptLibrary {
    /// Load from `path`, falling back to (and materializing) the default
    /// concepts when the file is missing or unparsable.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str::<ConceptsFile>(&raw) {
                Ok(file) => {
                    tracing::info!(count = file.concepts.len(), path = %path.display(), "Loaded concepts");
                    return Self {
                        concepts: file.concepts,
                    };
                }
                Err(e) => {
                    tracing::warn!(error = %e, path = %path.display(), "Concepts file invalid, using defaults");
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, path = %path.display(), "Concepts file unreadable, using defaults");
            }
        }

        let lib = Self {
            concepts: default_concepts(),
        };
        // Best-effort write-back; losing it only means defaults next boot too.
        let file = ConceptsFile {
            concepts: lib.concepts.clone(),
        };
        if let Ok(json) = serde_json::to_string_pretty(&file) {
            if let Err(e) = std::fs::write(path, json) {
                tracing::warn!(error = %e, "Could not materialize default concepts file");
            }
        }
        lib
    }

    pub fn from_concepts(concepts: Vec<Concept>) -> Self {
        Self { concepts }
    }

    pub fn find(&self, name: &str) -> Option<&Concept> {
        self.concepts.iter().find(|c| c.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.concepts.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.concepts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
    }
}

fn default_concepts() -> Vec<Concept> {
    vec![
        Concept {
            name: "Correlation".to_string(),
            golden_answer: "Correlation describes the strength and direction of a relationship \
                between two variables, ranging from -1 to 1. A value close to 1 indicates a strong \
                positive relationship, while a value close to -1 indicates a strong negative one. \
                Importantly, correlation does not imply causation. It only shows that two variables \
                change together. A third variable may influence both, which is why identifying \
                extraneous variables is essential."
                .to_string(),
        },
        Concept {
            name: "Confounders".to_string(),
            golden_answer: "A confounder is a variable that is related to both the independent and \
                dependent variables and can create a false impression of a relationship between \
                them. It can make it seem like X causes Y, when in reality the confounder might be \
                responsible for the effect. For example, physical activity may influence both the \
                likelihood of following a diet and the amount of weight lost."
                .to_string(),
        },
        Concept {
            name: "Moderators".to_string(),
            golden_answer: "A moderator affects the strength or direction of the relationship \
                between an independent and a dependent variable. It helps researchers understand \
                under what conditions or for whom an effect occurs. For instance, stress may change \
                how effective a diet is in producing weight loss by altering eating habits or \
                metabolism. Identifying moderators can provide more nuanced insights into how \
                variables interact."
                .to_string(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_valid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("concepts.json");
        std::fs::write(
            &path,
            r#"{"concepts":[{"name":"Recursion","golden_answer":"A function calling itself."}]}"#,
        )
        .unwrap();

        let lib = ConceptLibrary::load(&path);
        assert_eq!(lib.len(), 1);
        assert_eq!(lib.find("Recursion").unwrap().golden_answer, "A function calling itself.");
        assert!(lib.find("Correlation").is_none());
    }

    #[test]
    fn test_missing_file_materializes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("concepts.json");

        let lib = ConceptLibrary::load(&path);
        assert_eq!(lib.len(), 3);
        assert!(lib.find("Correlation").is_some());
        assert!(lib.find("Confounders").is_some());
        assert!(lib.find("Moderators").is_some());

        // Written back so the next load reads the same set.
        assert!(path.exists());
        let reloaded = ConceptLibrary::load(&path);
        assert_eq!(reloaded.names(), lib.names());
    }

    #[test]
    fn test_invalid_json_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("concepts.json");
        std::fs::write(&path, "not json at all").unwrap();

        let lib = ConceptLibrary::load(&path);
        assert_eq!(lib.len(), 3);
    }
}
