//! 建置依賴清單：宣告的第三方函式庫、連結方式與檔案匯入規則。
//!
//! 內建的清單對應 EmailDaemon 的原生建置：libcurl、zlib 與 mbedtls，
//! 全部靜態連結，libcurl 自帶的 SSL 關閉，TLS 由 mbedtls 提供。
//! 匯入規則依副檔名將各依賴安裝目錄中的檔案分到 `dependencies/{bin,lib,include}`。

use crate::config::toml_config::substitute_env_vars;
use crate::utils::error::{DaemonError, Result};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Component, Path};

/// 可以取代傳輸函式庫內建 TLS 的獨立 TLS 套件
pub const TLS_PACKAGES: [&str; 3] = ["mbedtls", "openssl", "wolfssl"];

const WILDCARD: &str = "*";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyManifest {
    pub requires: Vec<String>,
    pub project: ProjectInfo,
    #[serde(default)]
    pub options: Vec<OptionOverride>,
    #[serde(default)]
    pub imports: Vec<ImportRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub name: String,
    #[serde(default)]
    pub settings: Vec<String>,
    #[serde(default)]
    pub generators: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout: Option<String>,
}

/// 套件選項覆寫；`package = "*"` 套用到所有套件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionOverride {
    pub package: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shared: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub with_ssl: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRule {
    pub pattern: String,
    pub src: String,
    pub dst: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub name: String,
    pub version: String,
}

impl Requirement {
    pub fn parse(reference: &str) -> Result<Self> {
        match reference.split_once('/') {
            Some((name, version))
                if !name.trim().is_empty()
                    && !version.trim().is_empty()
                    && !version.contains('/') =>
            {
                Ok(Self {
                    name: name.trim().to_string(),
                    version: version.trim().to_string(),
                })
            }
            _ => Err(DaemonError::InvalidConfigValueError {
                field: "requires".to_string(),
                value: reference.to_string(),
                reason: "Expected '<name>/<version>'".to_string(),
            }),
        }
    }
}

impl ImportRule {
    pub fn new(pattern: &str, src: &str, dst: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            src: src.to_string(),
            dst: dst.to_string(),
        }
    }

    /// 將檔名萬用字元轉成錨定的正規表達式：`*` 任意長度，`?` 單一字元
    pub fn matcher(&self) -> Result<Regex> {
        let mut expr = String::with_capacity(self.pattern.len() + 8);
        expr.push('^');
        for ch in self.pattern.chars() {
            match ch {
                '*' => expr.push_str(".*"),
                '?' => expr.push('.'),
                other => expr.push_str(&regex::escape(&other.to_string())),
            }
        }
        expr.push('$');
        Ok(Regex::new(&expr)?)
    }

    pub fn matches(&self, file_name: &str) -> bool {
        self.matcher()
            .map(|re| re.is_match(file_name))
            .unwrap_or(false)
    }
}

fn is_relative_inside(path: &str) -> bool {
    let path = Path::new(path);
    !path.as_os_str().is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

impl DependencyManifest {
    /// EmailDaemon 的內建依賴清單
    pub fn email_daemon() -> Self {
        Self {
            requires: vec![
                "libcurl/8.12.1".to_string(),
                "zlib/1.2.13".to_string(),
                "mbedtls/3.5.0".to_string(),
            ],
            project: ProjectInfo {
                name: "EmailDaemon".to_string(),
                settings: ["os", "compiler", "build_type", "arch"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                generators: vec!["CMakeDeps".to_string(), "CMakeToolchain".to_string()],
                layout: Some("cmake".to_string()),
            },
            options: vec![
                OptionOverride {
                    package: WILDCARD.to_string(),
                    shared: Some(false),
                    with_ssl: None,
                },
                OptionOverride {
                    package: "libcurl".to_string(),
                    shared: None,
                    with_ssl: Some(false),
                },
            ],
            imports: vec![
                ImportRule::new("*.dll", "bin", "dependencies/bin"),
                ImportRule::new("*.so*", "lib", "dependencies/lib"),
                ImportRule::new("*.dylib*", "lib", "dependencies/lib"),
                ImportRule::new("*.h", "include", "dependencies/include"),
                ImportRule::new("*.a", "lib", "dependencies/lib"),
            ],
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| DaemonError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| DaemonError::ConfigError {
            message: format!("Failed to serialize manifest: {}", e),
        })
    }

    pub fn requirements(&self) -> Result<Vec<Requirement>> {
        self.requires.iter().map(|r| Requirement::parse(r)).collect()
    }

    pub fn requires_package(&self, name: &str) -> bool {
        self.requirements()
            .map(|reqs| reqs.iter().any(|r| r.name == name))
            .unwrap_or(false)
    }

    fn effective<F>(&self, package: &str, pick: F) -> Option<bool>
    where
        F: Fn(&OptionOverride) -> Option<bool>,
    {
        // 套件專屬設定優先於萬用字元，後出現的覆寫先出現的
        let specific = self
            .options
            .iter()
            .filter(|o| o.package == package)
            .filter_map(&pick)
            .last();
        specific.or_else(|| {
            self.options
                .iter()
                .filter(|o| o.package == WILDCARD)
                .filter_map(&pick)
                .last()
        })
    }

    /// 套件是否靜態連結；沒有任何 `shared` 設定時視為靜態
    pub fn is_static(&self, package: &str) -> bool {
        !self.effective(package, |o| o.shared).unwrap_or(false)
    }

    pub fn all_static(&self) -> bool {
        match self.requirements() {
            Ok(reqs) => reqs.iter().all(|r| self.is_static(&r.name)),
            Err(_) => false,
        }
    }

    pub fn with_ssl(&self, package: &str) -> Option<bool> {
        self.effective(package, |o| o.with_ssl)
    }

    /// 套件自身的 SSL 已關閉，且清單中另有獨立 TLS 套件
    pub fn ssl_delegated(&self, package: &str) -> bool {
        self.with_ssl(package) == Some(false) && self.tls_provider().is_some()
    }

    pub fn tls_provider(&self) -> Option<Requirement> {
        self.requirements()
            .ok()?
            .into_iter()
            .find(|r| TLS_PACKAGES.contains(&r.name.as_str()))
    }

    /// 依匯入規則的目的地分組
    pub fn destinations(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.imports
            .iter()
            .map(|rule| rule.dst.as_str())
            .filter(|dst| seen.insert(*dst))
            .collect()
    }

    pub fn validate_manifest(&self) -> Result<()> {
        validation::validate_non_empty_string("project.name", &self.project.name)?;

        let requirements = self.requirements()?;
        let mut names = HashSet::new();
        for req in &requirements {
            if !names.insert(req.name.as_str()) {
                return Err(DaemonError::InvalidConfigValueError {
                    field: "requires".to_string(),
                    value: req.name.clone(),
                    reason: "Package is required more than once".to_string(),
                });
            }
        }

        for option in &self.options {
            if option.package != WILDCARD && !names.contains(option.package.as_str()) {
                return Err(DaemonError::InvalidConfigValueError {
                    field: "options.package".to_string(),
                    value: option.package.clone(),
                    reason: "Option targets a package that is not required".to_string(),
                });
            }
        }

        for rule in &self.imports {
            validation::validate_non_empty_string("imports.pattern", &rule.pattern)?;
            if !is_relative_inside(&rule.src) {
                return Err(DaemonError::InvalidConfigValueError {
                    field: "imports.src".to_string(),
                    value: rule.src.clone(),
                    reason: "Source must be a relative path inside the package prefix"
                        .to_string(),
                });
            }
            if !is_relative_inside(&rule.dst) {
                return Err(DaemonError::InvalidConfigValueError {
                    field: "imports.dst".to_string(),
                    value: rule.dst.clone(),
                    reason: "Destination must be a relative path inside the staging root"
                        .to_string(),
                });
            }
            rule.matcher()?;
        }

        Ok(())
    }
}

impl Default for DependencyManifest {
    fn default() -> Self {
        Self::email_daemon()
    }
}

impl Validate for DependencyManifest {
    fn validate(&self) -> Result<()> {
        self.validate_manifest()
    }
}
