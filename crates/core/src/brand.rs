// Brand-risk matching
//
// Pure functions behind the recommendations engine: alias derivation from a
// seed domain (plus optional landing-page signals), keyword normalization,
// exact and bigram-Jaccard fuzzy matching, shard selection, and coverage.
//
// Decision: Fuzzy scores compare padded bigram sets so a one-letter typo in a
//           short brand still clears the threshold ("exmple" vs "example" = 0.67)
// Decision: A keyword is scored per token, per adjacent token pair, and as a whole

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// Minimum alias length considered for matching
pub const MIN_ALIAS_LEN: usize = 3;

/// Minimum concatenated length before a devoweled alias is generated
pub const DEVOWEL_MIN_LEN: usize = 5;

/// Fuzzy match threshold
pub const FUZZY_THRESHOLD: f64 = 0.6;

/// Two-label public suffixes collapsed when taking the SLD
const COMPOUND_SUFFIXES: [&str; 2] = ["co.uk", "ac.uk"];

// ============================================================================
// Results
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum MatchMethod {
    Exact,
    Fuzzy,
    None,
}

impl MatchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchMethod::Exact => "exact",
            MatchMethod::Fuzzy => "fuzzy",
            MatchMethod::None => "none",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum RiskSeverity {
    Error,
    Warn,
    None,
}

impl RiskSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskSeverity::Error => "error",
            RiskSeverity::Warn => "warn",
            RiskSeverity::None => "none",
        }
    }
}

impl fmt::Display for RiskSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Brand-risk verdict for one keyword
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct KeywordRisk {
    pub keyword: String,
    pub contains_brand: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_alias: Option<String>,
    pub method: MatchMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    pub severity: RiskSeverity,
}

/// Persisted alias set for a seed domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct BrandProfile {
    pub seed_domain: String,
    pub aliases: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

/// Brand coverage of a keyword set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Coverage {
    pub total_keywords: i64,
    pub brand_keywords: i64,
    pub coverage_ratio: f64,
    pub missing_aliases: Vec<String>,
}

/// Coverage persisted per `(seed_domain, account_id)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct CoverageResult {
    pub seed_domain: String,
    pub account_id: String,
    #[serde(flatten)]
    pub coverage: Coverage,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Normalization and alias derivation
// ============================================================================

/// Lower-case, drop everything except ASCII/Unicode alphanumerics and spaces,
/// collapse runs of whitespace.
pub fn normalize(input: &str) -> String {
    let kept: String = input
        .chars()
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Host of a seed without scheme, path, port or a leading `www.`
pub fn seed_host(seed: &str) -> String {
    let mut rest = seed.trim().to_ascii_lowercase();
    if let Some(idx) = rest.find("://") {
        rest = rest[idx + 3..].to_string();
    }
    let end = rest
        .find(|c: char| c == '/' || c == '?' || c == '#')
        .unwrap_or(rest.len());
    rest.truncate(end);
    if let Some(at) = rest.rfind('@') {
        rest = rest[at + 1..].to_string();
    }
    if let Some(colon) = rest.find(':') {
        rest.truncate(colon);
    }
    let rest = rest.trim_end_matches('.');
    rest.strip_prefix("www.").unwrap_or(rest).to_string()
}

/// Second-level label of a seed domain (`shop.example.co.uk` → `example`)
pub fn second_level_label(seed: &str) -> Option<String> {
    let host = seed_host(seed);
    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();
    if labels.is_empty() {
        return None;
    }
    let suffix_len = if labels.len() >= 3
        && COMPOUND_SUFFIXES
            .iter()
            .any(|s| host.ends_with(&format!(".{}", s)))
    {
        2
    } else {
        1
    };
    if labels.len() <= suffix_len {
        return Some(labels[0].to_string());
    }
    Some(labels[labels.len() - suffix_len - 1].to_string())
}

/// Keep the first letter, drop the remaining vowels (`example` → `exmpl`)
pub fn devowel(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => std::iter::once(first)
            .chain(chars.filter(|c| !matches!(c, 'a' | 'e' | 'i' | 'o' | 'u')))
            .collect(),
        None => String::new(),
    }
}

fn push_unique(aliases: &mut Vec<String>, alias: String) {
    if alias.chars().count() >= MIN_ALIAS_LEN && !aliases.contains(&alias) {
        aliases.push(alias);
    }
}

/// Brand part of a page title: the text before the first separator
fn title_brand(signal: &str) -> String {
    let head = signal
        .split(['|', '-', '–', '—', ':', '·'])
        .next()
        .unwrap_or(signal);
    normalize(head)
}

/// Derive the alias set for a seed domain plus landing-page signals
/// (`<title>`, `og:site_name`). Order is stable: domain aliases first.
pub fn derive_aliases(seed: &str, signals: &[String]) -> Vec<String> {
    let mut aliases = Vec::new();
    if let Some(label) = second_level_label(seed) {
        let base = normalize(&label.replace(['-', '_'], " "));
        let concat = base.replace(' ', "");
        push_unique(&mut aliases, base.clone());
        push_unique(&mut aliases, concat.clone());
        if concat.chars().count() >= DEVOWEL_MIN_LEN {
            let stripped = devowel(&concat);
            if stripped != concat {
                push_unique(&mut aliases, stripped);
            }
        }
    }
    for signal in signals {
        let brand = title_brand(signal);
        // Long titles are descriptions, not brand names
        if brand.is_empty() || brand.split(' ').count() > 4 {
            continue;
        }
        let concat = brand.replace(' ', "");
        push_unique(&mut aliases, brand);
        push_unique(&mut aliases, concat);
    }
    aliases
}

// ============================================================================
// Matching
// ============================================================================

fn bigrams(word: &str) -> BTreeSet<(char, char)> {
    let padded: Vec<char> = std::iter::once(' ')
        .chain(word.chars())
        .chain(std::iter::once(' '))
        .collect();
    padded.windows(2).map(|w| (w[0], w[1])).collect()
}

/// Jaccard similarity of the padded bigram sets of two words
pub fn jaccard(a: &str, b: &str) -> f64 {
    let left = bigrams(a);
    let right = bigrams(b);
    let union = left.union(&right).count();
    if union == 0 {
        return 0.0;
    }
    left.intersection(&right).count() as f64 / union as f64
}

/// Fuzzy score of a normalized keyword against one alias
pub fn fuzzy_score(normalized_keyword: &str, alias: &str) -> f64 {
    let alias = alias.replace(' ', "");
    let tokens: Vec<&str> = normalized_keyword.split(' ').filter(|t| !t.is_empty()).collect();
    let mut candidates: Vec<String> = tokens.iter().map(|t| t.to_string()).collect();
    candidates.extend(tokens.windows(2).map(|pair| pair.concat()));
    candidates.push(tokens.concat());
    candidates
        .iter()
        .filter(|c| !c.is_empty())
        .map(|c| jaccard(c, &alias))
        .fold(0.0, f64::max)
}

fn usable(alias: &str) -> bool {
    alias.chars().count() >= MIN_ALIAS_LEN
}

/// True when `alias` is the devoweled form of another alias in the set
fn is_devoweled_variant(alias: &str, aliases: &[String]) -> bool {
    aliases.iter().any(|other| {
        let concat = other.replace(' ', "");
        other != alias && concat.chars().count() >= DEVOWEL_MIN_LEN && devowel(&concat) == alias
    })
}

/// Aliases contained verbatim in the normalized keyword. Devoweled variants
/// only count as a whole token: every misspelling of the brand contains them.
pub fn exact_matches<'a>(normalized_keyword: &str, aliases: &'a [String]) -> Vec<&'a str> {
    aliases
        .iter()
        .filter(|a| usable(a))
        .filter(|a| {
            if is_devoweled_variant(a, aliases) {
                normalized_keyword.split(' ').any(|token| token == a.as_str())
            } else {
                normalized_keyword.contains(a.as_str())
            }
        })
        .map(String::as_str)
        .collect()
}

/// Best fuzzy alias and its score
pub fn best_fuzzy<'a>(normalized_keyword: &str, aliases: &'a [String]) -> Option<(&'a str, f64)> {
    aliases
        .iter()
        .filter(|a| usable(a))
        .map(|a| (a.as_str(), fuzzy_score(normalized_keyword, a)))
        .fold(None, |best: Option<(&str, f64)>, (alias, score)| match best {
            Some((_, top)) if top >= score => best,
            _ => Some((alias, score)),
        })
}

/// Classify one keyword against an alias set
pub fn match_brand(keyword: &str, aliases: &[String]) -> KeywordRisk {
    let normalized = normalize(keyword);

    let exact = exact_matches(&normalized, aliases);
    if let Some(alias) = exact
        .iter()
        .copied()
        .fold(None, |longest: Option<&str>, a| match longest {
            Some(l) if l.len() >= a.len() => Some(l),
            _ => Some(a),
        })
    {
        return KeywordRisk {
            keyword: keyword.to_string(),
            contains_brand: true,
            matched_alias: Some(alias.to_string()),
            method: MatchMethod::Exact,
            score: Some(1.0),
            severity: RiskSeverity::Error,
        };
    }

    match best_fuzzy(&normalized, aliases) {
        Some((alias, score)) if score >= FUZZY_THRESHOLD => KeywordRisk {
            keyword: keyword.to_string(),
            contains_brand: true,
            matched_alias: Some(alias.to_string()),
            method: MatchMethod::Fuzzy,
            score: Some((score * 1000.0).round() / 1000.0),
            severity: RiskSeverity::Warn,
        },
        _ => KeywordRisk {
            keyword: keyword.to_string(),
            contains_brand: false,
            matched_alias: None,
            method: MatchMethod::None,
            score: None,
            severity: RiskSeverity::None,
        },
    }
}

/// Coverage of a keyword set: share of keywords matching any alias, plus the
/// aliases no keyword matched (exactly, or as its best fuzzy alias).
pub fn coverage(keywords: &[String], aliases: &[String]) -> Coverage {
    let mut matched: BTreeSet<&str> = BTreeSet::new();
    let mut brand_keywords = 0i64;
    for keyword in keywords {
        let normalized = normalize(keyword);
        let exact = exact_matches(&normalized, aliases);
        if !exact.is_empty() {
            brand_keywords += 1;
            matched.extend(exact);
            continue;
        }
        if let Some((alias, score)) = best_fuzzy(&normalized, aliases) {
            if score >= FUZZY_THRESHOLD {
                brand_keywords += 1;
                matched.insert(alias);
            }
        }
    }
    let total_keywords = keywords.len() as i64;
    let coverage_ratio = if total_keywords == 0 {
        0.0
    } else {
        brand_keywords as f64 / total_keywords as f64
    };
    Coverage {
        total_keywords,
        brand_keywords,
        coverage_ratio,
        missing_aliases: aliases
            .iter()
            .filter(|a| usable(a) && !matched.contains(a.as_str()))
            .cloned()
            .collect(),
    }
}

// ============================================================================
// Sharding
// ============================================================================

/// 32-bit FNV-1a
pub fn fnv32a(input: &str) -> u32 {
    const OFFSET: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;
    input.bytes().fold(OFFSET, |hash, byte| {
        (hash ^ u32::from(byte)).wrapping_mul(PRIME)
    })
}

/// True when `keyword` belongs to `shard` out of `total_shards`.
/// `total_shards` of 0 or 1 selects everything.
pub fn in_shard(keyword: &str, shard: u32, total_shards: u32) -> bool {
    if total_shards <= 1 {
        return true;
    }
    fnv32a(keyword) % total_shards == shard
}
