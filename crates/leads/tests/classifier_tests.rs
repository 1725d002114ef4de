//! Email classification and best-email selection through the public API.

#![allow(clippy::unwrap_used)]

use leads::{classify, select_best_email, EmailCandidate, EmailCategory};

#[test]
fn automated_senders_are_never_recommended() {
    for email in [
        "noreply@acme.com.au",
        "no-reply@acme.com.au",
        "donotreply@acme.com.au",
        "mailer-daemon@acme.com.au",
        "postmaster@acme.com.au",
        "shop-notifications@acme.com.au",
    ] {
        let c = classify(email, Some("Jane"), Some("Smith"), Some("Owner"));
        assert_eq!(c.category, EmailCategory::Automated, "{email}");
        assert_eq!(c.priority_score, 0, "{email}");
        assert!(!c.is_recommended, "{email}");
    }
}

#[test]
fn contact_name_in_local_part_scores_highest() {
    let c = classify("jane.smith@acme.com.au", Some("Jane"), Some("Smith"), None);
    assert_eq!(c.category, EmailCategory::NamedPersonal);
    assert_eq!(c.priority_score, 95);
    assert!(c.is_recommended);

    let c = classify("jsmith@acme.com.au", None, Some("Smith"), None);
    assert_eq!(c.category, EmailCategory::NamedPersonal);
    assert_eq!(c.priority_score, 95);
}

#[test]
fn best_email_does_not_depend_on_input_order() {
    let mut candidates = vec![
        EmailCandidate::new("info@acme.com.au"),
        EmailCandidate::new("sales@acme.com.au"),
        EmailCandidate::new("noreply@acme.com.au"),
        EmailCandidate {
            email: "jane@acme.com.au".into(),
            first_name: Some("Jane".into()),
            confidence: Some(80),
            ..EmailCandidate::default()
        },
        EmailCandidate {
            email: "sam@acme.com.au".into(),
            first_name: Some("Sam".into()),
            confidence: Some(80),
            ..EmailCandidate::default()
        },
        EmailCandidate::new("owner@acme.com.au"),
    ];

    let expected = select_best_email(&candidates).unwrap();
    for _ in 0..candidates.len() {
        candidates.rotate_left(1);
        assert_eq!(select_best_email(&candidates).unwrap(), expected);
    }
    candidates.reverse();
    assert_eq!(select_best_email(&candidates).unwrap(), expected);

    // Tied on score and confidence, so the address breaks the tie.
    assert_eq!(expected.email, "jane@acme.com.au");
}

#[test]
fn no_candidates_means_no_best_email() {
    assert!(select_best_email(&[]).is_none());
}
