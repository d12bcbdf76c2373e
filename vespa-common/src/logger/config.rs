// Copyright 2022 Vespa Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::logger::LOGGER_STDOUT_NAME;

use log::LevelFilter;
use serde::Deserialize;

/// Default value for the color flag.
const DEFAULT_COLOR_ENABLED: bool = true;
/// Default name for an output.
const DEFAULT_OUTPUT_NAME: &str = LOGGER_STDOUT_NAME;
/// Default log level for an output.
const DEFAULT_OUTPUT_LEVEL: LevelFilter = LevelFilter::Info;

/// Builder for a logger output configuration.
#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggerOutputConfigBuilder {
    /// Name of an output file, or `stdout` for standard output.
    name: Option<String>,
    /// Log level filter of an output.
    level_filter: Option<LevelFilter>,
    /// Log target filters of an output.
    #[serde(default)]
    target_filters: Vec<String>,
}

impl LoggerOutputConfigBuilder {
    /// Creates a new builder for a logger output configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the name of a logger output.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name.replace(name.into());
        self
    }

    /// Sets the level of a logger output.
    pub fn level_filter(mut self, level: LevelFilter) -> Self {
        self.level_filter.replace(level);
        self
    }

    /// Builds a logger output configuration.
    pub fn finish(self) -> LoggerOutputConfig {
        LoggerOutputConfig {
            name: self.name.unwrap_or_else(|| DEFAULT_OUTPUT_NAME.to_owned()),
            level_filter: self.level_filter.unwrap_or(DEFAULT_OUTPUT_LEVEL),
            target_filters: self.target_filters.iter().map(|f| f.to_lowercase()).collect(),
        }
    }
}

/// Logger output configuration.
#[derive(Clone)]
pub struct LoggerOutputConfig {
    pub(crate) name: String,
    pub(crate) level_filter: LevelFilter,
    pub(crate) target_filters: Vec<String>,
}

/// Builder for a logger configuration.
#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggerConfigBuilder {
    /// Color flag of the logger.
    color_enabled: Option<bool>,
    /// Outputs of the logger.
    #[serde(default)]
    outputs: Vec<LoggerOutputConfigBuilder>,
}

impl LoggerConfigBuilder {
    /// Creates a new builder for a logger configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the color flag of the logger.
    pub fn color_enabled(mut self, color: bool) -> Self {
        self.color_enabled.replace(color);
        self
    }

    /// Adds an output to the logger.
    pub fn output(mut self, output: LoggerOutputConfigBuilder) -> Self {
        self.outputs.push(output);
        self
    }

    /// Builds a logger configuration.
    pub fn finish(self) -> LoggerConfig {
        let mut outputs: Vec<LoggerOutputConfig> = self.outputs.into_iter().map(LoggerOutputConfigBuilder::finish).collect();

        if outputs.is_empty() {
            outputs.push(LoggerOutputConfigBuilder::new().finish());
        }

        LoggerConfig {
            color_enabled: self.color_enabled.unwrap_or(DEFAULT_COLOR_ENABLED),
            outputs,
        }
    }
}

/// Logger configuration.
#[derive(Clone)]
pub struct LoggerConfig {
    pub(crate) color_enabled: bool,
    pub(crate) outputs: Vec<LoggerOutputConfig>,
}

impl LoggerConfig {
    /// Creates a builder for a logger configuration.
    pub fn build() -> LoggerConfigBuilder {
        LoggerConfigBuilder::new()
    }
}
