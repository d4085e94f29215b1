//! 配置模块，负责加载JSON配置文件
//!
//! Compiler limits plus the record-type to table/collection mapping used
//! when composing a full query around a compiled filter.

use crate::ast::FilterNode;
use crate::error::CompileError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("配置文件不存在: {}", .0.display())]
    NotFound(PathBuf),
    #[error("无法读取配置文件 {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("无法解析JSON配置文件 {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Bounds on what a single compile call accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerLimits {
    /// Deepest filter tree accepted
    pub max_depth: usize,
    /// Longest `In`/`NotIn`/`ContainsAny` argument list
    pub max_in_values: usize,
    pub max_sort_keys: usize,
}

impl Default for CompilerLimits {
    fn default() -> Self {
        Self {
            max_depth: 64,
            max_in_values: 1000,
            max_sort_keys: 8,
        }
    }
}

impl CompilerLimits {
    /// Returns the tree depth, or an error if it is over `max_depth`.
    pub fn check_depth(&self, node: &FilterNode) -> Result<usize, CompileError> {
        node.depth_within(self.max_depth)
            .ok_or(CompileError::LimitExceeded {
                what: "filter depth",
                limit: self.max_depth,
            })
    }

    pub fn check_list(&self, len: usize) -> Result<(), CompileError> {
        if len > self.max_in_values {
            return Err(CompileError::LimitExceeded {
                what: "value list",
                limit: self.max_in_values,
            });
        }
        Ok(())
    }

    pub fn check_sort_keys(&self, len: usize) -> Result<(), CompileError> {
        if len > self.max_sort_keys {
            return Err(CompileError::LimitExceeded {
                what: "sort key count",
                limit: self.max_sort_keys,
            });
        }
        Ok(())
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    pub limits: CompilerLimits,
    /// Record type name to relational table name
    pub tables: HashMap<String, String>,
    /// Record type name to document collection name
    pub collections: HashMap<String, String>,
}

impl CompilerConfig {
    /// 从JSON文件加载配置
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();

        if !path_ref.exists() {
            return Err(ConfigError::NotFound(path_ref.to_path_buf()));
        }

        let content = fs::read_to_string(path_ref).map_err(|source| ConfigError::Io {
            path: path_ref.to_path_buf(),
            source,
        })?;

        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path_ref.to_path_buf(),
            source,
        })
    }

    /// 获取记录类型对应的表名，如果不存在则返回小写的类型名
    pub fn table_name(&self, record_type: &str) -> String {
        self.tables
            .get(record_type)
            .cloned()
            .unwrap_or_else(|| record_type.to_lowercase())
    }

    /// 获取记录类型对应的集合名，如果不存在则返回小写的类型名
    pub fn collection_name(&self, record_type: &str) -> String {
        self.collections
            .get(record_type)
            .cloned()
            .unwrap_or_else(|| record_type.to_lowercase())
    }
}
