//! Result parsing: raw output files → structured result.

use serde_json::{json, Map, Value};

use crate::error::{CoreError, CoreResult};
use crate::model::SimulationResult;
use crate::pipeline::convert::SimulationContext;
use crate::scheduler::FileSet;

pub trait ResultParser: Send + Sync {
    fn parse(&self, files: &FileSet, context: &SimulationContext) -> CoreResult<SimulationResult>;
}

/// Collects every output file into the result document.
///
/// `.json` outputs are embedded as parsed JSON, anything else as text. A run
/// that produced no output at all is a parse failure.
#[derive(Debug, Default, Clone)]
pub struct FileSetParser;

impl ResultParser for FileSetParser {
    fn parse(&self, files: &FileSet, context: &SimulationContext) -> CoreResult<SimulationResult> {
        if files.is_empty() {
            return Err(CoreError::Parse("simulation produced no output files".to_string()));
        }

        let mut outputs = Map::new();
        for (name, contents) in files {
            let value = if name.ends_with(".json") {
                serde_json::from_str(contents)
                    .map_err(|e| CoreError::Parse(format!("{}: {}", name, e)))?
            } else {
                Value::String(contents.clone())
            };
            outputs.insert(name.clone(), value);
        }

        Ok(SimulationResult {
            body: json!({
                "outputs": outputs,
                "context": context.data,
            }),
        })
    }
}
