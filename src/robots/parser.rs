//! Robots.txt parser implementation
//!
//! Allow/Disallow matching is delegated to the robotstxt crate; the
//! Crawl-delay extension is read here since that crate does not expose it.

use robotstxt::DefaultMatcher;
use std::time::Duration;

/// Parsed robots.txt data for one domain
#[derive(Debug, Clone, Default)]
pub struct ParsedRobots {
    /// Raw robots.txt content; empty means allow everything
    content: String,
}

/// One `User-agent` group and the Crawl-delay declared inside it
#[derive(Debug, Default)]
struct AgentGroup {
    agents: Vec<String>,
    crawl_delay: Option<f64>,
}

impl ParsedRobots {
    pub fn from_content(content: &str) -> Self {
        Self {
            content: content.to_string(),
        }
    }

    /// A permissive policy, used when robots.txt is missing or unreachable
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn is_allow_all(&self) -> bool {
        self.content.trim().is_empty()
    }

    /// Checks if a URL is allowed for the given user agent
    ///
    /// # Arguments
    ///
    /// * `url` - Absolute URL or path to check
    /// * `user_agent` - The crawler's product token (e.g. "SumiHarvest")
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        if self.is_allow_all() {
            return true;
        }

        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, user_agent, url)
    }

    /// Returns the Crawl-delay that applies to `user_agent`
    ///
    /// A group naming the agent wins over the `*` group. Consecutive
    /// `User-agent` lines share one group.
    pub fn crawl_delay(&self, user_agent: &str) -> Option<Duration> {
        if self.is_allow_all() {
            return None;
        }

        let agent = user_agent.to_lowercase();
        let groups = self.groups();

        let specific = groups
            .iter()
            .find(|g| g.agents.iter().any(|a| a != "*" && agent.contains(a.as_str())))
            .and_then(|g| g.crawl_delay);
        let wildcard = groups
            .iter()
            .find(|g| g.agents.iter().any(|a| a == "*"))
            .and_then(|g| g.crawl_delay);

        specific
            .or(wildcard)
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(Duration::from_secs_f64)
    }

    fn groups(&self) -> Vec<AgentGroup> {
        let mut groups: Vec<AgentGroup> = Vec::new();
        let mut collecting_agents = false;

        for line in self.content.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();

            match key.as_str() {
                "user-agent" => {
                    if !collecting_agents {
                        groups.push(AgentGroup::default());
                        collecting_agents = true;
                    }
                    if let Some(group) = groups.last_mut() {
                        group.agents.push(value.to_lowercase());
                    }
                }
                "crawl-delay" => {
                    collecting_agents = false;
                    if let (Some(group), Ok(delay)) = (groups.last_mut(), value.parse::<f64>()) {
                        group.crawl_delay = Some(delay);
                    }
                }
                _ => collecting_agents = false,
            }
        }

        groups
    }
}
