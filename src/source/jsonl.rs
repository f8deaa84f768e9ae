use super::{DataSource, RecordIter};
use anyhow::{anyhow, Context};
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

enum Inputs {
    Files(Vec<PathBuf>),
    Pattern(String),
}

/// Record files holding one JSON document per line
///
/// A source built from a glob pattern re-resolves the pattern every time the
/// input list is requested, so files added later change the fingerprint.
pub struct JsonLinesSource {
    inputs: Inputs,
}

impl JsonLinesSource {
    pub fn from_files<I, P>(files: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            inputs: Inputs::Files(files.into_iter().map(Into::into).collect()),
        }
    }

    pub fn from_glob(pattern: impl Into<String>) -> anyhow::Result<Self> {
        let pattern = pattern.into();
        glob::Pattern::new(&pattern).with_context(|| format!("invalid glob pattern {pattern}"))?;
        Ok(Self {
            inputs: Inputs::Pattern(pattern),
        })
    }
}

impl DataSource<Value> for JsonLinesSource {
    fn locations(&self) -> anyhow::Result<Vec<String>> {
        match &self.inputs {
            Inputs::Files(files) => Ok(files
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect()),
            Inputs::Pattern(pattern) => {
                let mut found = Vec::new();
                for entry in glob::glob(pattern)? {
                    let path = entry?;
                    if path.is_file() {
                        found.push(path.to_string_lossy().into_owned());
                    }
                }
                found.sort();
                Ok(found)
            }
        }
    }

    fn records<'a>(&'a self, location: &str) -> anyhow::Result<RecordIter<'a, Value>> {
        let file = File::open(location).with_context(|| format!("failed to open {location}"))?;
        let location = location.to_string();
        let lines = BufReader::new(file).lines().enumerate();

        let iter = lines.filter_map(move |(idx, line)| {
            let line = match line {
                Ok(line) => line,
                Err(e) => return Some(Err(anyhow!(e).context(format!("reading {location}")))),
            };
            if line.trim().is_empty() {
                return None;
            }
            Some(
                serde_json::from_str::<Value>(&line)
                    .with_context(|| format!("{}:{}: malformed record", location, idx + 1)),
            )
        });
        Ok(Box::new(iter))
    }
}
