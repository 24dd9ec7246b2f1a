use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::ReviewRequest;

/// Inbound image review envelope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageReview {
    /// Object kind, echoed back unchanged
    #[serde(default)]
    pub kind: String,

    /// API version, echoed back unchanged
    #[serde(default, rename = "apiVersion")]
    pub api_version: String,

    pub spec: ImageReviewSpec,
}

/// The `spec` object of the envelope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageReviewSpec {
    #[serde(default)]
    pub containers: Vec<ImageReviewContainerSpec>,

    #[serde(default)]
    pub annotations: BTreeMap<String, String>,

    #[serde(default)]
    pub namespace: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageReviewContainerSpec {
    #[serde(default)]
    pub image: String,
}

impl ImageReview {
    /// Convert to the engine's request type.
    pub fn to_review_request(&self) -> ReviewRequest {
        ReviewRequest {
            images: self
                .spec
                .containers
                .iter()
                .map(|c| c.image.clone())
                .collect(),
            namespace: self.spec.namespace.clone(),
            annotations: self.spec.annotations.clone(),
        }
    }
}
