//! Request classification.
//!
//! A single ordered rule table maps each intercepted request to a
//! [`StrategyTag`]. Rules are evaluated top to bottom and the first match
//! wins:
//!
//! | # | rule            | matches                                          | tag                    |
//! |---|-----------------|--------------------------------------------------|------------------------|
//! | 0 | forced-refresh  | `only-if-cached` on a non same-origin request    | passthrough            |
//! | 1 | unsafe-method   | anything but `GET`                               | passthrough            |
//! | 2 | api             | API host, or path under an API prefix            | network-first          |
//! | 3 | tabular-data    | data namespace path with a row-oriented suffix   | stale-while-revalidate |
//! | 4 | images          | image host, or image extension                   | cache-first            |
//! | 5 | shell           | style/script/markup extension                    | cache-first            |
//! | 6 | default         | everything else                                  | network-first          |

use regex::Regex;
use serde::{Deserialize, Serialize};
use shellcache_core::{Error, RouteConfig};
use std::fmt;

use crate::fetch::{CacheMode, Request, RequestMode};

/// Caching algorithm chosen for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyTag {
    CacheFirst,
    NetworkFirst,
    StaleWhileRevalidate,
    Passthrough,
}

impl fmt::Display for StrategyTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StrategyTag::CacheFirst => "cache-first",
            StrategyTag::NetworkFirst => "network-first",
            StrategyTag::StaleWhileRevalidate => "stale-while-revalidate",
            StrategyTag::Passthrough => "passthrough",
        };
        f.write_str(name)
    }
}

/// A browser hard refresh asks for `only-if-cached` on a cross-origin
/// request. Answering it would deadlock the reload, so it is never handled.
pub fn is_forced_refresh(request: &Request) -> bool {
    request.cache == CacheMode::OnlyIfCached && request.mode != RequestMode::SameOrigin
}

#[derive(Debug)]
enum Matcher {
    ForcedRefresh,
    UnsafeMethod,
    Hosts(Vec<String>),
    PathPrefixes(Vec<String>),
    Path(Regex),
    AnyOf(Vec<Matcher>),
    Always,
}

impl Matcher {
    fn matches(&self, request: &Request) -> bool {
        match self {
            Matcher::ForcedRefresh => is_forced_refresh(request),
            Matcher::UnsafeMethod => !request.is_safe_read(),
            Matcher::Hosts(hosts) => request
                .url
                .host_str()
                .is_some_and(|host| hosts.iter().any(|h| h.eq_ignore_ascii_case(host))),
            Matcher::PathPrefixes(prefixes) => prefixes.iter().any(|p| request.url.path().starts_with(p.as_str())),
            Matcher::Path(re) => re.is_match(request.url.path()),
            Matcher::AnyOf(matchers) => matchers.iter().any(|m| m.matches(request)),
            Matcher::Always => true,
        }
    }
}

#[derive(Debug)]
struct Rule {
    name: &'static str,
    matcher: Matcher,
    tag: StrategyTag,
}

/// Ordered rule table.
#[derive(Debug)]
pub struct Classifier {
    rules: Vec<Rule>,
}

impl Classifier {
    /// Build the rule table from the route configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if an extension list produces an invalid pattern.
    pub fn from_config(routes: &RouteConfig) -> Result<Self, Error> {
        let mut rules = vec![
            Rule { name: "forced-refresh", matcher: Matcher::ForcedRefresh, tag: StrategyTag::Passthrough },
            Rule { name: "unsafe-method", matcher: Matcher::UnsafeMethod, tag: StrategyTag::Passthrough },
            Rule {
                name: "api",
                matcher: Matcher::AnyOf(vec![
                    Matcher::Hosts(routes.api_hosts.clone()),
                    Matcher::PathPrefixes(routes.api_path_prefixes.clone()),
                ]),
                tag: StrategyTag::NetworkFirst,
            },
        ];

        if let Some(data) = extension_pattern(&routes.data_extensions, Some(&routes.data_path_prefix))? {
            rules.push(Rule { name: "tabular-data", matcher: Matcher::Path(data), tag: StrategyTag::StaleWhileRevalidate });
        }

        let mut image_matchers = vec![Matcher::Hosts(routes.image_hosts.clone())];
        if let Some(images) = extension_pattern(&routes.image_extensions, None)? {
            image_matchers.push(Matcher::Path(images));
        }
        rules.push(Rule { name: "images", matcher: Matcher::AnyOf(image_matchers), tag: StrategyTag::CacheFirst });

        if let Some(shell) = extension_pattern(&routes.shell_extensions, None)? {
            rules.push(Rule { name: "shell", matcher: Matcher::Path(shell), tag: StrategyTag::CacheFirst });
        }

        rules.push(Rule { name: "default", matcher: Matcher::Always, tag: StrategyTag::NetworkFirst });

        Ok(Self { rules })
    }

    /// Pick the strategy for a request. First matching rule wins.
    pub fn classify(&self, request: &Request) -> StrategyTag {
        for (index, rule) in self.rules.iter().enumerate() {
            if rule.matcher.matches(request) {
                tracing::debug!(url = %request.url, rule = rule.name, index, strategy = %rule.tag, "classified");
                return rule.tag;
            }
        }
        StrategyTag::NetworkFirst
    }

    /// Rule names and tags in evaluation order.
    pub fn rules(&self) -> impl Iterator<Item = (&'static str, StrategyTag)> + '_ {
        self.rules.iter().map(|r| (r.name, r.tag))
    }
}

/// `(?i)^<prefix>.*\.(ext|ext)$` or `(?i)\.(ext|ext)$`; None when no extensions are configured.
fn extension_pattern(extensions: &[String], prefix: Option<&str>) -> Result<Option<Regex>, Error> {
    let alternatives: Vec<String> = extensions
        .iter()
        .map(|e| e.trim().trim_start_matches('.'))
        .filter(|e| !e.is_empty())
        .map(regex::escape)
        .collect();

    if alternatives.is_empty() {
        return Ok(None);
    }

    let pattern = match prefix {
        Some(prefix) => format!(r"(?i)^{}.*\.({})$", regex::escape(prefix), alternatives.join("|")),
        None => format!(r"(?i)\.({})$", alternatives.join("|")),
    };

    Regex::new(&pattern)
        .map(Some)
        .map_err(|e| Error::InvalidInput(format!("invalid route pattern {pattern}: {e}")))
}
