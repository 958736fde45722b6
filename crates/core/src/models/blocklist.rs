//! Blocklist: releases the operator has banned from re-grabbing

use crate::models::indexer::Protocol;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlocklistEntry {
    pub id: Uuid,
    pub movie_id: Option<Uuid>,
    pub source_title: String,
    pub guid: String,
    pub indexer_id: Option<i32>,
    pub protocol: Protocol,
    pub date: DateTime<Utc>,
    pub reason: Option<String>,
}

impl BlocklistEntry {
    pub fn new(
        source_title: impl Into<String>,
        guid: impl Into<String>,
        protocol: Protocol,
        date: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            movie_id: None,
            source_title: source_title.into(),
            guid: guid.into(),
            indexer_id: None,
            protocol,
            date,
            reason: None,
        }
    }
}
