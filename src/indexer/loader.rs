//! Document loaders: turn one source file into `(field, text)` documents

use std::path::Path;

use serde::Deserialize;

use crate::error::{MorselError, Result};

/// One document extracted from a source file.
///
/// `fields` keeps source order, which heading/body linking relies on.
/// `links` are paths, relative to the source root, of secondary files whose
/// text is folded into this document.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LoadedDocument {
    pub fields: Vec<(String, String)>,
    pub links: Vec<String>,
}

impl LoadedDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.fields.push((name.into(), text.into()));
        self
    }

    pub fn with_link(mut self, path: impl Into<String>) -> Self {
        self.links.push(path.into());
        self
    }
}

/// Extracts documents from source files of the kinds it handles
pub trait DocumentLoader: Send + Sync {
    fn name(&self) -> &'static str;

    fn handles(&self, path: &Path) -> bool;

    fn load(&self, path: &Path, contents: &[u8]) -> Result<Vec<LoadedDocument>>;
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| extensions.iter().any(|x| e.eq_ignore_ascii_case(x)))
        .unwrap_or(false)
}

/// Loads `.json` files holding one document or an array of them.
///
/// A document is either `{"fields": [[name, text], ...], "links": [...]}`,
/// which preserves field order, or a flat `{name: text | [text, ...]}` map
/// (keys in sorted order, `links` reserved).
pub struct JsonLoader;

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonSource {
    Many(Vec<JsonDocument>),
    One(JsonDocument),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonDocument {
    Ordered {
        fields: Vec<(String, String)>,
        #[serde(default)]
        links: Vec<String>,
    },
    Flat(serde_json::Map<String, serde_json::Value>),
}

impl JsonDocument {
    fn into_loaded(self) -> Result<LoadedDocument> {
        match self {
            JsonDocument::Ordered { fields, links } => Ok(LoadedDocument { fields, links }),
            JsonDocument::Flat(map) => {
                let mut doc = LoadedDocument::new();
                for (name, value) in map {
                    let texts = json_texts(&name, value)?;
                    if name == "links" {
                        doc.links.extend(texts);
                    } else {
                        doc.fields
                            .extend(texts.into_iter().map(|t| (name.clone(), t)));
                    }
                }
                Ok(doc)
            }
        }
    }
}

fn json_texts(name: &str, value: serde_json::Value) -> Result<Vec<String>> {
    use serde_json::Value;

    match value {
        Value::String(s) => Ok(vec![s]),
        Value::Number(n) => Ok(vec![n.to_string()]),
        Value::Bool(b) => Ok(vec![b.to_string()]),
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => {
            let mut texts = Vec::with_capacity(items.len());
            for item in items {
                texts.extend(json_texts(name, item)?);
            }
            Ok(texts)
        }
        Value::Object(_) => Err(MorselError::Internal(format!(
            "field '{}' holds a nested object",
            name
        ))),
    }
}

impl DocumentLoader for JsonLoader {
    fn name(&self) -> &'static str {
        "json"
    }

    fn handles(&self, path: &Path) -> bool {
        has_extension(path, &["json"])
    }

    fn load(&self, _path: &Path, contents: &[u8]) -> Result<Vec<LoadedDocument>> {
        let docs = match serde_json::from_slice::<JsonSource>(contents)? {
            JsonSource::Many(docs) => docs,
            JsonSource::One(doc) => vec![doc],
        };
        docs.into_iter().map(JsonDocument::into_loaded).collect()
    }
}

/// Loads `.txt`/`.md` files: the file stem becomes the title, the content
/// the text field
pub struct PlainTextLoader {
    text_field: String,
    title_field: Option<String>,
}

impl PlainTextLoader {
    pub fn new(text_field: impl Into<String>) -> Self {
        Self {
            text_field: text_field.into(),
            title_field: Some("title".to_string()),
        }
    }

    pub fn without_title(mut self) -> Self {
        self.title_field = None;
        self
    }
}

impl DocumentLoader for PlainTextLoader {
    fn name(&self) -> &'static str {
        "text"
    }

    fn handles(&self, path: &Path) -> bool {
        has_extension(path, &["txt", "md"])
    }

    fn load(&self, path: &Path, contents: &[u8]) -> Result<Vec<LoadedDocument>> {
        let mut doc = LoadedDocument::new();
        if let Some(title_field) = &self.title_field {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                doc.fields.push((title_field.clone(), stem.to_string()));
            }
        }
        doc.fields.push((
            self.text_field.clone(),
            String::from_utf8_lossy(contents).into_owned(),
        ));
        Ok(vec![doc])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_ordered_document() {
        let data = br#"{"fields": [["title", "Intro"], ["heading", "Setup"], ["body", "install it"]],
                         "links": ["extra/notes.txt"]}"#;
        let docs = JsonLoader.load(Path::new("a.json"), data).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].fields[1], ("heading".to_string(), "Setup".to_string()));
        assert_eq!(docs[0].links, vec!["extra/notes.txt".to_string()]);
    }

    #[test]
    fn test_json_flat_array() {
        let data = br#"[{"title": "A", "body": ["one", "two"]}, {"body": "three", "links": "x.txt"}]"#;
        let docs = JsonLoader.load(Path::new("many.json"), data).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(
            docs[0].fields,
            vec![
                ("body".to_string(), "one".to_string()),
                ("body".to_string(), "two".to_string()),
                ("title".to_string(), "A".to_string()),
            ]
        );
        assert_eq!(docs[1].links, vec!["x.txt".to_string()]);
    }

    #[test]
    fn test_json_rejects_nested_object() {
        let data = br#"{"body": {"nested": true}}"#;
        assert!(JsonLoader.load(Path::new("bad.json"), data).is_err());
    }

    #[test]
    fn test_plain_text_loader() {
        let loader = PlainTextLoader::new("body");
        assert!(loader.handles(Path::new("notes/a.TXT")));
        assert!(!loader.handles(Path::new("a.json")));

        let docs = loader
            .load(Path::new("notes/guide.md"), b"hello world")
            .unwrap();
        assert_eq!(
            docs[0].fields,
            vec![
                ("title".to_string(), "guide".to_string()),
                ("body".to_string(), "hello world".to_string()),
            ]
        );
    }
}
