//! Job configuration
//!
//! Configuration is built up by zero or more partial updates before
//! submission. An update only touches the fields it carries: absent or empty
//! fields leave the stored value alone, present ones replace it wholesale.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Free-form parameter map
pub type ParamMap = BTreeMap<String, Value>;

/// Configuration sent to the service at submission
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobConfiguration {
    pub param: ParamMap,
    pub env: ParamMap,
    pub slurm: ParamMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executable_folder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_folder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_folder: Option<String>,
}

/// A partial configuration update
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobConfigUpdate {
    pub param: Option<ParamMap>,
    pub env: Option<ParamMap>,
    pub slurm: Option<ParamMap>,
    pub executable_folder: Option<String>,
    pub data_folder: Option<String>,
    pub result_folder: Option<String>,
}

impl JobConfigUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one job parameter
    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.param
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Add one environment variable
    pub fn env(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.env
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Add one scheduler setting
    pub fn slurm(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.slurm
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn executable_folder(mut self, folder: impl Into<String>) -> Self {
        self.executable_folder = Some(folder.into());
        self
    }

    pub fn data_folder(mut self, folder: impl Into<String>) -> Self {
        self.data_folder = Some(folder.into());
        self
    }

    pub fn result_folder(mut self, folder: impl Into<String>) -> Self {
        self.result_folder = Some(folder.into());
        self
    }

    /// True if applying this update cannot change anything
    pub fn is_noop(&self) -> bool {
        fn empty_map(m: &Option<ParamMap>) -> bool {
            m.as_ref().map_or(true, BTreeMap::is_empty)
        }
        fn empty_str(s: &Option<String>) -> bool {
            s.as_deref().map_or(true, str::is_empty)
        }

        empty_map(&self.param)
            && empty_map(&self.env)
            && empty_map(&self.slurm)
            && empty_str(&self.executable_folder)
            && empty_str(&self.data_folder)
            && empty_str(&self.result_folder)
    }
}

impl JobConfiguration {
    /// Apply a partial update; returns true if anything changed
    pub fn merge(&mut self, update: JobConfigUpdate) -> bool {
        let before = self.clone();

        merge_map(&mut self.param, update.param);
        merge_map(&mut self.env, update.env);
        merge_map(&mut self.slurm, update.slurm);
        merge_str(&mut self.executable_folder, update.executable_folder);
        merge_str(&mut self.data_folder, update.data_folder);
        merge_str(&mut self.result_folder, update.result_folder);

        *self != before
    }

    /// Request body for the configuration upload: every set field plus the token
    pub fn to_request_body(&self, access_token: &str) -> Result<Value, serde_json::Error> {
        let mut body: Map<String, Value> = serde_json::from_value(serde_json::to_value(self)?)?;
        body.insert("accessToken".to_string(), Value::String(access_token.to_string()));
        Ok(Value::Object(body))
    }
}

fn merge_map(target: &mut ParamMap, update: Option<ParamMap>) {
    if let Some(map) = update.filter(|m| !m.is_empty()) {
        *target = map;
    }
}

fn merge_str(target: &mut Option<String>, update: Option<String>) {
    if let Some(s) = update.filter(|s| !s.is_empty()) {
        *target = Some(s);
    }
}
