//! Static table of known subscription providers and the mailbox search
//! queries used to find their billing emails. Loaded once at process start;
//! never mutated at runtime.

use crate::entities::SubscriptionCategory;
use once_cell::sync::Lazy;

/// A known subscription-issuing service.
#[derive(Debug, Clone)]
pub struct Provider {
    pub name: &'static str,
    /// Mailbox search query for this provider's billing mail.
    pub query: &'static str,
    /// Sender domains this provider bills from.
    pub domains: &'static [&'static str],
    pub category: SubscriptionCategory,
    /// Extra ranking weight for providers that are almost always present in
    /// a subscriber's mailbox and worth fetching first.
    pub priority_boost: f64,
}

const HIGH_VALUE_BOOST: f64 = 10.0;

static PROVIDERS: Lazy<Vec<Provider>> = Lazy::new(|| {
    vec![
        Provider {
            name: "Netflix",
            query: "from:netflix.com (subject:payment OR subject:receipt OR subject:membership)",
            domains: &["netflix.com"],
            category: SubscriptionCategory::Entertainment,
            priority_boost: HIGH_VALUE_BOOST,
        },
        Provider {
            name: "Spotify",
            query: "from:spotify.com (subject:receipt OR subject:premium)",
            domains: &["spotify.com"],
            category: SubscriptionCategory::Entertainment,
            priority_boost: HIGH_VALUE_BOOST,
        },
        Provider {
            name: "Amazon Prime",
            query: "from:amazon.com subject:(prime membership OR prime payment)",
            domains: &["amazon.com", "amazon.co.uk"],
            category: SubscriptionCategory::Shopping,
            priority_boost: HIGH_VALUE_BOOST,
        },
        Provider {
            name: "Disney+",
            query: "from:disneyplus.com (subject:payment OR subject:receipt)",
            domains: &["disneyplus.com", "disney.com"],
            category: SubscriptionCategory::Entertainment,
            priority_boost: 0.0,
        },
        Provider {
            name: "Hulu",
            query: "from:hulu.com subject:(payment OR billing)",
            domains: &["hulu.com"],
            category: SubscriptionCategory::Entertainment,
            priority_boost: 0.0,
        },
        Provider {
            name: "YouTube Premium",
            query: "from:youtube.com subject:(membership OR payment)",
            domains: &["youtube.com", "google.com"],
            category: SubscriptionCategory::Entertainment,
            priority_boost: 0.0,
        },
        Provider {
            name: "Apple",
            query: "from:apple.com subject:(receipt OR subscription)",
            domains: &["apple.com", "itunes.com"],
            category: SubscriptionCategory::Productivity,
            priority_boost: HIGH_VALUE_BOOST,
        },
        Provider {
            name: "Adobe",
            query: "from:adobe.com subject:(invoice OR payment)",
            domains: &["adobe.com"],
            category: SubscriptionCategory::Productivity,
            priority_boost: 0.0,
        },
        Provider {
            name: "Dropbox",
            query: "from:dropbox.com subject:(receipt OR renewal)",
            domains: &["dropbox.com", "dropboxmail.com"],
            category: SubscriptionCategory::Productivity,
            priority_boost: 0.0,
        },
        Provider {
            name: "Notion",
            query: "from:notion.so subject:(receipt OR invoice)",
            domains: &["notion.so", "makenotion.com"],
            category: SubscriptionCategory::Productivity,
            priority_boost: 0.0,
        },
        Provider {
            name: "The New York Times",
            query: "from:nytimes.com subject:(payment OR subscription)",
            domains: &["nytimes.com"],
            category: SubscriptionCategory::News,
            priority_boost: 0.0,
        },
        Provider {
            name: "GitHub",
            query: "from:github.com subject:(receipt OR payment)",
            domains: &["github.com"],
            category: SubscriptionCategory::Productivity,
            priority_boost: 0.0,
        },
    ]
});

/// Every provider the scan searches for, in fixed order.
pub fn all() -> &'static [Provider] {
    &PROVIDERS
}

/// Case-insensitive lookup by provider name.
pub fn find(name: &str) -> Option<&'static Provider> {
    PROVIDERS
        .iter()
        .find(|p| p.name.eq_ignore_ascii_case(name.trim()))
}

/// Match a sender address or domain against a provider's known domains.
pub fn domain_matches(provider: &Provider, sender: &str) -> bool {
    let sender = sender.to_ascii_lowercase();
    provider
        .domains
        .iter()
        .any(|d| sender.ends_with(d) || sender.contains(&format!("@{d}")) || sender.contains(&format!(".{d}")))
}
