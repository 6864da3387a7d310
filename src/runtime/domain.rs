//! Host matching for rule domain lists and page-level `@if` conditions

use super::document::PageState;
use crate::types::RuleCondition;

/// Whether a rule scoped to `domains` applies on `host`.
///
/// A `*` entry matches unconditionally, even alongside exclusions.
/// Otherwise exclusions (`!fragment`) disqualify any host that contains the
/// fragment, and an empty list, or one made only of exclusions, matches
/// every remaining host.
pub fn domain_matches(domains: &[String], host: &str) -> bool {
    if domains.iter().any(|d| d.trim() == "*") {
        return true;
    }
    let host = host.trim().to_lowercase();

    let mut positive = Vec::new();
    for domain in domains.iter().map(|d| d.trim()).filter(|d| !d.is_empty()) {
        match domain.strip_prefix('!') {
            Some(excluded) => {
                if !excluded.is_empty() && host.contains(&excluded.to_lowercase()) {
                    return false;
                }
            }
            None => positive.push(domain),
        }
    }

    positive.is_empty() || positive.iter().any(|domain| host_matches(domain, &host))
}

fn host_matches(domain: &str, host: &str) -> bool {
    let domain = domain.to_lowercase();
    if domain == "*" {
        return true;
    }
    if let Some(suffix) = domain.strip_prefix("*.") {
        return host.ends_with(suffix);
    }
    host == domain || host.ends_with(&format!(".{}", domain))
}

/// Evaluate an `@if(kind op value)` page condition.
///
/// Kinds: `scroll` (vertical offset), `viewport`/`width`, `height`, and
/// `time` (`HH:MM`, local). Unknown kinds, operators or unreadable values
/// leave the rule enabled.
pub fn condition_holds(condition: Option<&RuleCondition>, page: &PageState) -> bool {
    let Some(condition) = condition else {
        return true;
    };

    let actual = match condition.kind.to_lowercase().as_str() {
        "always" => return true,
        "scroll" => page.scroll_y,
        "viewport" | "width" => page.viewport_width,
        "height" => page.viewport_height,
        "time" => f64::from(page.minutes_since_midnight),
        other => {
            log::debug!("Unknown page condition '{}', treating as satisfied", other);
            return true;
        }
    };

    let expected = if condition.kind.eq_ignore_ascii_case("time") {
        parse_clock(&condition.value).map(f64::from)
    } else {
        condition
            .value
            .trim_end_matches("px")
            .parse::<f64>()
            .ok()
    };

    let Some(expected) = expected else {
        log::debug!(
            "Unreadable value '{}' in @if({} {} {})",
            condition.value,
            condition.kind,
            condition.op,
            condition.value
        );
        return true;
    };

    match condition.op.as_str() {
        "<" => actual < expected,
        ">" => actual > expected,
        "<=" => actual <= expected,
        ">=" => actual >= expected,
        "==" | "=" => (actual - expected).abs() < f64::EPSILON,
        _ => true,
    }
}

/// `HH:MM` to minutes since midnight
pub fn parse_clock(text: &str) -> Option<u32> {
    let (hours, minutes) = text.trim().split_once(':')?;
    let hours: u32 = hours.parse().ok()?;
    let minutes: u32 = minutes.parse().ok()?;
    if hours < 24 && minutes < 60 {
        Some(hours * 60 + minutes)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domains(list: &[&str]) -> Vec<String> {
        list.iter().map(|d| d.to_string()).collect()
    }

    #[test]
    fn test_wildcard_matches_everything() {
        assert!(domain_matches(&domains(&["*"]), "example.com"));
        assert!(domain_matches(&domains(&["*"]), "localhost"));
        assert!(domain_matches(&[], "example.com"));
    }

    #[test]
    fn test_exclusion() {
        let list = domains(&["!x.com"]);
        assert!(!domain_matches(&list, "x.com"));
        assert!(!domain_matches(&list, "www.x.com"));
        assert!(domain_matches(&list, "y.org"));

        let scoped = domains(&["example.com", "!ads.example.com"]);
        assert!(!domain_matches(&scoped, "ads.example.com"));
        assert!(domain_matches(&scoped, "news.example.com"));
    }

    #[test]
    fn test_wildcard_wins_over_exclusion() {
        let mixed = domains(&["*", "!ads.example.com"]);
        assert!(domain_matches(&mixed, "ads.example.com"));
        assert!(domain_matches(&mixed, "example.com"));
    }

    #[test]
    fn test_subdomain_wildcard() {
        let list = domains(&["*.x.com"]);
        assert!(domain_matches(&list, "a.x.com"));
        assert!(domain_matches(&list, "deep.a.x.com"));
        assert!(!domain_matches(&list, "y.com"));
    }

    #[test]
    fn test_exact_and_dotted_suffix() {
        let list = domains(&["example.com"]);
        assert!(domain_matches(&list, "example.com"));
        assert!(domain_matches(&list, "news.example.com"));
        assert!(!domain_matches(&list, "badexample.com"));
        assert!(domain_matches(&list, "EXAMPLE.com"));
    }

    #[test]
    fn test_page_conditions() {
        let page = PageState {
            scroll_y: 600.0,
            minutes_since_midnight: 22 * 60 + 15,
            ..PageState::default()
        };

        let holds = |text: &str| condition_holds(Some(&RuleCondition::parse(text)), &page);
        assert!(holds("scroll > 500"));
        assert!(!holds("scroll < 500"));
        assert!(holds("viewport >= 1280"));
        assert!(!holds("height > 800"));
        assert!(holds("time >= 22:00"));
        assert!(!holds("time < 06:00"));
        assert!(holds("weather == rainy"));
        assert!(holds("scroll > lots"));
        assert!(condition_holds(None, &page));
    }

    #[test]
    fn test_parse_clock() {
        assert_eq!(parse_clock("07:30"), Some(450));
        assert_eq!(parse_clock("24:00"), None);
        assert_eq!(parse_clock("noon"), None);
    }
}
