//! Ignore rules for build context packaging
//!
//! 一つのルールは「パターン + 極性」の組です。
//!
//! # Grammar
//!
//! - `!` で始まるルールは除外の取り消し（強制的に含める）
//! - それ以外は glob パターン: `*` と `?` は `/` をまたがない、`[...]` は文字クラス、
//!   パス要素全体としての `**` は任意個のディレクトリにマッチ
//! - 先頭の `/` と `./`、末尾の `/` は無視される
//! - ホストのパス区切り文字は照合前に `/` へ正規化される
//!
//! ルールは宣言順に評価され、最初にマッチしたルールが結果を決める。
//! どのルールにもマッチしなければ含める。

use crate::error::{ContextError, Result};
use glob::{MatchOptions, Pattern};
use std::path::Path;

/// Entries skipped by name regardless of the configured rules.
pub const COMMON_IGNORE: &[&str] = &[".git", ".hg", ".svn"];

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Outcome of evaluating a path against a rule list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Include,
    Exclude,
}

/// A compiled ignore pattern together with its polarity.
#[derive(Debug, Clone)]
pub struct IgnoreRule {
    raw: String,
    pattern: Pattern,
    is_ignore: bool,
}

impl IgnoreRule {
    /// Compile a raw rule string.
    pub fn compile(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let (is_ignore, body) = match trimmed.strip_prefix('!') {
            Some(rest) => (false, rest.trim_start()),
            None => (true, trimmed),
        };

        let body = normalize_separators(body);
        let body = body.strip_prefix("./").unwrap_or(&body);
        let body = body.trim_start_matches('/').trim_end_matches('/');

        if body.is_empty() {
            return Err(ContextError::InvalidPattern {
                pattern: raw.to_string(),
                reason: "pattern is empty".to_string(),
            });
        }

        let pattern = Pattern::new(body).map_err(|e| ContextError::InvalidPattern {
            pattern: raw.to_string(),
            reason: e.msg.to_string(),
        })?;

        Ok(Self {
            raw: raw.to_string(),
            pattern,
            is_ignore,
        })
    }

    /// The pattern as it was written.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// `false` for `!` rules.
    pub fn is_ignore(&self) -> bool {
        self.is_ignore
    }

    /// Test a path relative to the context root.
    pub fn matches(&self, relative_path: &str) -> bool {
        let path = normalize_separators(relative_path);
        self.pattern
            .matches_with(path.trim_start_matches('/'), MATCH_OPTIONS)
    }

    fn decision(&self) -> Decision {
        if self.is_ignore {
            Decision::Exclude
        } else {
            Decision::Include
        }
    }
}

/// Ordered rule list, first match wins.
#[derive(Debug, Clone, Default)]
pub struct IgnoreRules {
    rules: Vec<IgnoreRule>,
}

impl IgnoreRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile every pattern up front so a bad one fails before any archiving starts.
    ///
    /// Blank entries are skipped.
    pub fn parse<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let rules = patterns
            .into_iter()
            .filter(|p| !p.as_ref().trim().is_empty())
            .map(|p| IgnoreRule::compile(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!("Compiled {} ignore rules", rules.len());
        Ok(Self { rules })
    }

    /// Load a `.dockerignore` style file: one pattern per line, `#` comments.
    pub fn from_file(path: &Path) -> Result<Self> {
        Self::parse(read_patterns(path)?)
    }

    pub fn push(&mut self, rule: IgnoreRule) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[IgnoreRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Evaluate the rules in order against a relative path.
    pub fn decide(&self, relative_path: &str) -> Decision {
        self.rules
            .iter()
            .find(|rule| rule.matches(relative_path))
            .map(IgnoreRule::decision)
            .unwrap_or(Decision::Include)
    }

    pub fn is_excluded(&self, relative_path: &str) -> bool {
        self.decide(relative_path) == Decision::Exclude
    }
}

/// Raw patterns of an ignore file, comments and blank lines removed.
pub fn read_patterns(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        return Err(ContextError::IgnoreFileNotFound(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

/// Whether a file name belongs to the fixed common-ignore set.
pub fn is_common_ignore(name: &str) -> bool {
    COMMON_IGNORE.contains(&name)
}

/// ホストの区切り文字を `/` に置き換える
pub fn normalize_separators(path: &str) -> String {
    if std::path::MAIN_SEPARATOR == '/' {
        path.to_string()
    } else {
        path.replace(std::path::MAIN_SEPARATOR, "/")
    }
}
