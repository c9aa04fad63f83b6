use chrono::{DateTime, Duration, Utc};

use crate::models::Article;

/// A set is stale when its oldest local write is more than `ttl` old.
/// An empty set is always stale.
pub fn is_stale_at(articles: &[Article], ttl: Duration, now: DateTime<Utc>) -> bool {
    match articles.iter().map(|a| a.cached_at).min() {
        Some(oldest) => now - oldest > ttl,
        None => true,
    }
}

/// Most recent local write across the set, `None` when empty.
pub fn last_updated_time(articles: &[Article]) -> Option<DateTime<Utc>> {
    articles.iter().map(|a| a.cached_at).max()
}

/// Short relative age such as "5m ago" for status lines.
pub fn age_display(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let minutes = (now - then).num_minutes();
    if minutes < 1 {
        // Also covers clock skew
        "just now".to_string()
    } else if minutes < 60 {
        format!("{}m ago", minutes)
    } else if minutes < 1440 {
        let hours = minutes / 60;
        if minutes % 60 >= 30 {
            format!("{}h ago", hours + 1)
        } else {
            format!("{}h ago", hours)
        }
    } else {
        let days = minutes / 1440;
        if (minutes % 1440) / 60 >= 12 {
            format!("{}d ago", days + 1)
        } else {
            format!("{}d ago", days)
        }
    }
}
