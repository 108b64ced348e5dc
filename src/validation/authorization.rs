use std::collections::{BTreeMap, BTreeSet};

use crate::validation::{
    error::{ValidatorError, unauthorized},
    types::AuthorizationConfig,
};

const WILDCARD_REQUESTER: &str = "*";

pub struct Authorizer {
    required: Option<String>,
    grants: BTreeMap<String, BTreeSet<String>>,
}

impl Authorizer {
    pub fn new(config: &AuthorizationConfig) -> Self {
        let grants = config
            .grants
            .iter()
            .map(|(requester, capabilities)| {
                (
                    requester.clone(),
                    capabilities.iter().cloned().collect::<BTreeSet<_>>(),
                )
            })
            .collect();
        Self {
            required: config.required_capability.clone(),
            grants,
        }
    }

    pub fn check(&self, requester: &str) -> Result<(), ValidatorError> {
        let Some(required) = &self.required else {
            return Ok(());
        };

        let granted = [requester, WILDCARD_REQUESTER]
            .iter()
            .filter_map(|key| self.grants.get(*key))
            .any(|capabilities| capabilities.contains(required));
        if granted {
            Ok(())
        } else {
            Err(unauthorized(format!(
                "requester '{requester}' lacks capability '{required}'"
            )))
        }
    }
}
