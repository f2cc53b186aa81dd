use ferroscan_core::{classify, FailureClass};
use serde::Serialize;

use crate::cli::ClassifyArgs;
use crate::error::CliError;

use super::CommandResult;

#[derive(Debug, Serialize)]
struct Classification<'a> {
    error: &'a str,
    class: FailureClass,
    quarantines_proxy: bool,
}

#[derive(Debug, Serialize)]
struct ClassifyResponseData<'a> {
    classifications: Vec<Classification<'a>>,
}

pub fn run(args: &ClassifyArgs) -> Result<CommandResult, CliError> {
    let classifications = args
        .errors
        .iter()
        .map(|error| {
            let class = classify(Some(error.as_str()));
            Classification {
                error: error.as_str(),
                class,
                quarantines_proxy: class.is_hard(),
            }
        })
        .collect();

    let data = serde_json::to_value(ClassifyResponseData { classifications })?;
    Ok(CommandResult::ok(data))
}
