//! Cross-plugin recommendation correlation
//!
//! Recommendation plugins often key results by cloud-native identifiers
//! (instance ids, ARNs) rather than the infra-as-code URN. A recommendation's
//! `resource_id` is matched against, in order: the primary id, the
//! `resourceId`/`cloudId` properties, the `arn` property, then the generic
//! `id` property. The first resource to claim an identifier keeps it.

use crate::plugin::{CostResult, Recommendation, ResourceDescriptor};
use std::collections::HashMap;

const CLOUD_ID_PROPERTIES: [&str; 2] = ["resourceId", "cloudId"];
const ARN_PROPERTY: &str = "arn";
const GENERIC_ID_PROPERTY: &str = "id";

/// Lookup from any known identifier to the owning resource index.
#[derive(Debug, Default)]
pub struct Correlator<'a> {
    index: HashMap<&'a str, usize>,
}

impl<'a> Correlator<'a> {
    pub fn new(resources: &'a [ResourceDescriptor]) -> Self {
        let mut index: HashMap<&'a str, usize> = HashMap::new();

        // Insert by precedence tier across all resources so a primary id always
        // beats another resource's alternate id.
        for (i, r) in resources.iter().enumerate() {
            if !r.id.is_empty() {
                index.entry(r.id.as_str()).or_insert(i);
            }
        }
        let tiers: [&[&str]; 3] = [&CLOUD_ID_PROPERTIES, &[ARN_PROPERTY], &[GENERIC_ID_PROPERTY]];
        for properties in tiers {
            for (i, r) in resources.iter().enumerate() {
                for property in properties {
                    if let Some(value) = r.property_str(property) {
                        index.entry(value).or_insert(i);
                    }
                }
            }
        }

        Self { index }
    }

    /// Index of the resource identified by `key`, if any.
    pub fn resolve(&self, key: &str) -> Option<usize> {
        if key.is_empty() {
            return None;
        }
        self.index.get(key).copied()
    }
}

/// Attach `recommendations` to the cost result of the resource they name.
///
/// Recommendations with an empty `resource_id` are dropped. Those matching no
/// result are returned as unattached.
pub fn attach_recommendations(
    results: &mut [CostResult],
    resources: &[ResourceDescriptor],
    recommendations: Vec<Recommendation>,
) -> Vec<Recommendation> {
    let correlator = Correlator::new(resources);
    let result_index: HashMap<String, usize> = results
        .iter()
        .enumerate()
        .map(|(i, r)| (r.resource_id.clone(), i))
        .collect();

    let mut unattached = Vec::new();
    let mut dropped = 0usize;
    for rec in recommendations {
        if rec.resource_id.is_empty() {
            dropped += 1;
            continue;
        }
        let target = correlator
            .resolve(&rec.resource_id)
            .and_then(|i| result_index.get(&resources[i].id).copied());
        match target {
            Some(i) => results[i].recommendations.push(rec),
            None => unattached.push(rec),
        }
    }

    if dropped > 0 {
        tracing::debug!(dropped, "Dropped recommendations without a resource id");
    }
    unattached
}
