//! Keyword tables for email classification.

/// Local-part substrings of machine senders.
pub const AUTOMATED: &[&str] = &[
    "noreply",
    "no-reply",
    "no_reply",
    "donotreply",
    "do-not-reply",
    "do_not_reply",
    "bounce",
    "mailer-daemon",
    "mailerdaemon",
    "postmaster",
    "autoreply",
    "auto-reply",
    "notifications",
    "daemon",
];

/// Roles that identify one accountable person.
pub const ROLE: &[&str] = &[
    "owner",
    "ceo",
    "founder",
    "director",
    "manager",
    "president",
    "principal",
    "partner",
    "md",
    "gm",
    "head",
];

/// Departments routed to a team inbox.
pub const DEPARTMENT: &[&str] = &[
    "sales",
    "marketing",
    "business",
    "bd",
    "dev",
    "accounts",
    "accounting",
    "finance",
    "hr",
    "operations",
    "ops",
    "it",
    "support",
    "service",
    "customerservice",
    "bookings",
    "orders",
    "media",
    "press",
    "partnerships",
    "events",
    "wholesale",
    "purchasing",
    "careers",
    "jobs",
];

/// Departments worth pitching directly.
pub const RECOMMENDED_DEPARTMENT: &[&str] = &["sales", "marketing", "business"];

/// Place names and premises words that mark a branch inbox.
pub const LOCATION: &[&str] = &[
    "melbourne",
    "sydney",
    "brisbane",
    "perth",
    "adelaide",
    "hobart",
    "darwin",
    "canberra",
    "geelong",
    "ballarat",
    "bendigo",
    "cairns",
    "townsville",
    "newcastle",
    "wollongong",
    "goldcoast",
    "office",
    "shop",
    "branch",
    "depot",
    "store",
    "warehouse",
    "showroom",
];

/// Catch-all inboxes.
pub const GENERIC: &[&str] = &[
    "info",
    "contact",
    "contactus",
    "hello",
    "hi",
    "enquiries",
    "enquiry",
    "inquiries",
    "inquiry",
    "admin",
    "office",
    "support",
    "help",
    "mail",
    "email",
    "team",
    "general",
    "reception",
    "studio",
    "web",
    "webmaster",
    "feedback",
    "welcome",
];

/// Seniority phrases by tier. Matched as whole words against the position.
pub const SENIORITY_TIERS: &[(u8, &[&str])] = &[
    (
        25,
        &[
            "ceo",
            "coo",
            "cfo",
            "cto",
            "cmo",
            "cio",
            "founder",
            "cofounder",
            "co founder",
            "owner",
            "proprietor",
            "managing director",
            "chief executive",
        ],
    ),
    (
        20,
        &[
            "director",
            "vp",
            "vice president",
            "head",
            "general manager",
            "gm",
        ],
    ),
    (15, &["manager", "lead", "leader", "supervisor"]),
    (10, &["senior", "sr", "principal", "chief"]),
];

/// Whether `word` appears in any keyword table.
pub fn is_known_word(word: &str) -> bool {
    [AUTOMATED, ROLE, DEPARTMENT, LOCATION, GENERIC]
        .iter()
        .any(|table| table.contains(&word))
}

/// `local == kw` or `local` starts with `kw.`.
pub fn matches_prefix<'a>(local: &str, table: &[&'a str]) -> Option<&'a str> {
    table.iter().copied().find(|kw| {
        local == *kw
            || local
                .strip_prefix(kw)
                .is_some_and(|rest| rest.starts_with('.'))
    })
}
