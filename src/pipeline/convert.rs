//! Model conversion: stored setup → execution input files.

use serde_json::{json, Map, Value};

use crate::error::{CoreError, CoreResult};
use crate::model::Setup;
use crate::scheduler::FileSet;

/// Data captured at conversion time that the result parser needs later.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulationContext {
    pub data: Value,
}

/// Output of a successful conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversion {
    pub context: SimulationContext,
    pub files: FileSet,
}

/// Turns a version's setup into the files the simulation binary reads.
pub trait ModelConverter: Send + Sync {
    fn convert(&self, setup: &Setup) -> CoreResult<Conversion>;
}

/// Name under which the full setup document is handed to the simulation.
pub const SETUP_FILE_NAME: &str = "setup.json";

/// Converter for setups that carry their input decks verbatim.
///
/// The setup must be a JSON object. Every string entry of its optional
/// `files` object becomes an input file; the whole document is also written
/// as `setup.json`.
#[derive(Debug, Default, Clone)]
pub struct JsonSetupConverter;

impl ModelConverter for JsonSetupConverter {
    fn convert(&self, setup: &Setup) -> CoreResult<Conversion> {
        let Value::Object(body) = &setup.body else {
            return Err(CoreError::Conversion("setup must be a JSON object".to_string()));
        };

        let mut files = FileSet::new();
        let empty = Map::new();
        let declared = match body.get("files") {
            None => &empty,
            Some(Value::Object(declared)) => declared,
            Some(_) => {
                return Err(CoreError::Conversion("`files` must be an object".to_string()));
            }
        };

        for (name, contents) in declared {
            let Value::String(text) = contents else {
                return Err(CoreError::Conversion(format!(
                    "input file `{}` must be a string",
                    name
                )));
            };
            if name == SETUP_FILE_NAME {
                return Err(CoreError::Conversion(format!(
                    "input file name `{}` is reserved",
                    name
                )));
            }
            files.insert(name.clone(), text.clone());
        }

        let document = serde_json::to_string_pretty(&setup.body)
            .map_err(|e| CoreError::Conversion(e.to_string()))?;
        files.insert(SETUP_FILE_NAME.to_string(), document);

        let inputs: Vec<&String> = files.keys().collect();
        Ok(Conversion {
            context: SimulationContext {
                data: json!({ "inputs": inputs }),
            },
            files,
        })
    }
}
