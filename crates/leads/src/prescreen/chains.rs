//! Known franchise and national chain names.

use crate::normalize::keyword_haystack;

/// Chain keywords looked for inside normalized business names.
pub const KNOWN_CHAINS: &[&str] = &[
    // Outdoor and sporting
    "macpac",
    "kathmandu",
    "rebel",
    "anaconda",
    "bcf",
    "rays outdoors",
    "mountain designs",
    "paddy pallin",
    "decathlon",
    "snowgum",
    "intersport",
    // Department and hardware
    "kmart",
    "big w",
    "target",
    "myer",
    "david jones",
    "bunnings",
    "mitre 10",
    "harvey norman",
    "jb hi fi",
    "officeworks",
    "supercheap auto",
    "repco",
    "autobarn",
    // Food
    "mcdonalds",
    "hungry jacks",
    "kfc",
    "subway",
    "dominos",
    "pizza hut",
    "red rooster",
    "nandos",
    "guzman y gomez",
    "starbucks",
    "gloria jeans",
    "boost juice",
    "coles",
    "woolworths",
    "aldi",
    "iga",
    "7 eleven",
    // Pharmacy and services
    "chemist warehouse",
    "priceline",
    "terry white",
    "australia post",
    "ampol",
    "caltex",
    // Banks
    "commonwealth bank",
    "commbank",
    "westpac",
    "anz",
    "nab",
    "national australia bank",
    "st george",
    "bankwest",
    "suncorp",
    // Telcos
    "telstra",
    "optus",
    "vodafone",
    "tpg",
    "iinet",
];

/// The first known chain whose keyword occurs in `business_name`.
///
/// Whole-word hits win so the reported chain is the one actually named;
/// otherwise any keyword inside the name with spaces removed counts
/// ("BCFAltona", "Rebelsport").
#[must_use]
pub fn match_chain(business_name: &str) -> Option<&'static str> {
    let haystack = keyword_haystack(business_name);
    if let Some(chain) = KNOWN_CHAINS
        .iter()
        .copied()
        .find(|chain| haystack.contains(&format!(" {chain} ")))
    {
        return Some(chain);
    }
    let squashed: String = haystack.split_whitespace().collect();
    KNOWN_CHAINS
        .iter()
        .copied()
        .find(|chain| squashed.contains(&chain.replace(' ', "")))
}
