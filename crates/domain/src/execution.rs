use keygate_core::{AppError, AppResult};

/// Position of the resource-type segment in an engine resource identifier.
///
/// Workflow identifiers follow the engine's colon-separated resource naming
/// scheme, e.g. `wf:states:prod:acct-1:template:grant-lifecycle`. The sixth
/// segment carries the resource type.
const TYPE_SEGMENT_INDEX: usize = 5;

/// Name of the wait state a grant execution parks in while its window is
/// open. A grant is ACTIVE exactly while its execution sits in this state.
pub const WAIT_FOR_WINDOW_END_STATE: &str = "Wait for Window End";

/// Derives the deterministic execution identifier for a grant.
///
/// The workflow template identifier has its type segment replaced with
/// `execution` and the grant identifier appended as the final segment, so one
/// grant always maps to exactly one execution.
pub fn execution_identifier(workflow_identifier: &str, grant_id: &str) -> AppResult<String> {
    let mut segments: Vec<&str> = workflow_identifier.split(':').collect();
    if segments.len() <= TYPE_SEGMENT_INDEX {
        return Err(AppError::Validation(format!(
            "workflow identifier '{workflow_identifier}' has fewer than {} segments",
            TYPE_SEGMENT_INDEX + 1
        )));
    }

    segments[TYPE_SEGMENT_INDEX] = "execution";
    segments.push(grant_id);

    Ok(segments.join(":"))
}


#[cfg(test)]
mod properties {
    use proptest::prelude::*;

    use super::execution_identifier;

    proptest! {
        #[test]
        fn derivation_always_yields_execution_type_and_verbatim_grant_id(
            grant_id in "[a-z0-9_]{1,64}",
            template_name in "[a-z-]{1,16}",
        ) {
            let workflow = format!("wf:states:prod:acct-1:template:{template_name}");
            let derived = execution_identifier(workflow.as_str(), grant_id.as_str());
            prop_assert!(derived.is_ok());

            let derived = derived.unwrap_or_default();
            let segments: Vec<&str> = derived.split(':').collect();
            prop_assert_eq!(segments[5], "execution");
            prop_assert_eq!(segments.last().copied(), Some(grant_id.as_str()));
        }
    }
}
