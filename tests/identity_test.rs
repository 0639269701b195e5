mod helpers;

use helpers::TestDatabase;
use textora_backend::error::AppError;
use textora_backend::models::*;

fn claim(social_id: &str, email: &str) -> IdentityClaim {
    IdentityClaim {
        social_id: Some(social_id.to_string()),
        email: Some(email.to_string()),
        display_name: None,
    }
}

#[tokio::test]
async fn test_same_ip_resolves_to_same_anonymous_user() {
    let db = TestDatabase::new().await;

    let first = db.identity.find_or_create_by_ip("203.0.113.9").await.unwrap();
    let second = db.identity.find_or_create_by_ip("203.0.113.9").await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(first.username, second.username);
    assert!(!first.is_authorized);
    assert!(first.anon_user_id.is_some());
    // Signup grant applied once.
    assert_eq!(first.balance_tokens, Tokens::from_whole(5));
}

#[tokio::test]
async fn test_login_without_prior_user_creates_authorized_account() {
    let db = TestDatabase::new().await;

    let user = db
        .identity
        .resolve_and_link(&claim("google:1", "a@example.com"), Some("198.51.100.1"))
        .await
        .unwrap();

    assert!(user.is_authorized);
    assert_eq!(user.social_id.as_deref(), Some("google:1"));
    assert_eq!(user.email.as_deref(), Some("a@example.com"));
    assert_eq!(user.ip.as_deref(), Some("198.51.100.1"));
}

#[tokio::test]
async fn test_login_adopts_existing_anonymous_user() {
    let db = TestDatabase::new().await;
    let anon = db.identity.find_or_create_by_ip("198.51.100.2").await.unwrap();

    let user = db
        .identity
        .resolve_and_link(&claim("google:2", "b@example.com"), Some("198.51.100.2"))
        .await
        .unwrap();

    // Same row, now authorized and carrying the claim.
    assert_eq!(user.id, anon.id);
    assert!(user.is_authorized);
    assert_eq!(user.social_id.as_deref(), Some("google:2"));
    assert_eq!(user.balance_tokens, anon.balance_tokens);
}

#[tokio::test]
async fn test_merge_combines_balances_without_double_counting() {
    let db = TestDatabase::new().await;

    // Identified account: balance 3, one anonymous job on record.
    let identified = db
        .identity
        .resolve_and_link(&claim("google:3", "c@example.com"), None)
        .await
        .unwrap();
    sqlx::query("UPDATE users SET balance_tokens = ?2, tokens_used_as_anon = 1 WHERE id = ?1")
        .bind(identified.id)
        .bind(Tokens::from_whole(3))
        .execute(&db.pool)
        .await
        .unwrap();

    // Anonymous account on the IP: balance 2, four anonymous jobs.
    let anon = db.anon_user("198.51.100.3", 2).await;
    sqlx::query("UPDATE users SET tokens_used_as_anon = 4 WHERE id = ?1")
        .bind(anon.id)
        .execute(&db.pool)
        .await
        .unwrap();
    let anon_job = db
        .job_repo
        .create_queued(anon.id, None, Tokens::ONE, None, None)
        .await
        .unwrap();

    let merged = db
        .identity
        .resolve_and_link(&claim("google:3", "c@example.com"), Some("198.51.100.3"))
        .await
        .unwrap();

    assert_eq!(merged.id, identified.id);
    assert_eq!(merged.balance_tokens, Tokens::from_whole(5));
    assert_eq!(merged.tokens_used_as_anon, 4, "Counter takes max, never sum");

    // The anonymous row is gone and its job repointed.
    assert!(db.user_repo.find_by_id(anon.id).await.unwrap().is_none());
    let job = db.job_repo.find_by_id(anon_job.id).await.unwrap().unwrap();
    assert_eq!(job.user_id, Some(merged.id));
}

#[tokio::test]
async fn test_login_without_any_hints_is_rejected() {
    let db = TestDatabase::new().await;

    let err = db
        .identity
        .resolve_and_link(&IdentityClaim::default(), None)
        .await
        .expect_err("A login with no hints must fail");
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn test_authorized_ip_row_is_not_merged() {
    let db = TestDatabase::new().await;

    // Someone else's authorized account sits on this IP.
    let other = db
        .identity
        .resolve_and_link(&claim("google:4", "d@example.com"), Some("198.51.100.4"))
        .await
        .unwrap();

    let user = db
        .identity
        .resolve_and_link(&claim("google:5", "e@example.com"), Some("198.51.100.4"))
        .await
        .unwrap();

    // The second login gets its own account with its own claim.
    assert_ne!(user.id, other.id);
    assert_eq!(user.social_id.as_deref(), Some("google:5"));
    assert_eq!(user.email.as_deref(), Some("e@example.com"));

    // The first account keeps its login linkage untouched.
    let other = db
        .user_repo
        .find_by_id(other.id)
        .await
        .unwrap()
        .expect("First account must survive");
    assert_eq!(other.social_id.as_deref(), Some("google:4"));
    assert_eq!(other.email.as_deref(), Some("d@example.com"));
}

#[tokio::test]
async fn test_attach_email_rules() {
    let db = TestDatabase::new().await;
    let user = db.user_with_balance(0).await;
    let other = db.user_with_balance(0).await;

    let updated = db
        .identity
        .attach_email(user.id, "f@example.com", Some(true))
        .await
        .unwrap();
    assert_eq!(updated.email.as_deref(), Some("f@example.com"));
    assert!(updated.is_accepted_promo);

    // Re-submitting the same email is idempotent.
    let again = db
        .identity
        .attach_email(user.id, "f@example.com", None)
        .await
        .unwrap();
    assert_eq!(again.id, user.id);

    // A different email on a user that already has one is a conflict.
    let err = db
        .identity
        .attach_email(user.id, "g@example.com", None)
        .await
        .expect_err("Changing email must conflict");
    assert!(matches!(err, AppError::Conflict(_)));

    // An email owned by another user is a conflict.
    let err = db
        .identity
        .attach_email(other.id, "f@example.com", None)
        .await
        .expect_err("Stealing an email must conflict");
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn test_attach_email_normalizes_before_checks() {
    let db = TestDatabase::new().await;
    let user = db.user_with_balance(0).await;
    let other = db.user_with_balance(0).await;

    let updated = db
        .identity
        .attach_email(user.id, "  H@Example.COM ", None)
        .await
        .unwrap();
    assert_eq!(updated.email.as_deref(), Some("h@example.com"));

    // Case variants of the same address stay idempotent for the owner...
    let again = db
        .identity
        .attach_email(user.id, "h@EXAMPLE.com", None)
        .await
        .unwrap();
    assert_eq!(again.id, user.id);

    // ...and conflict for everyone else.
    let err = db
        .identity
        .attach_email(other.id, "H@example.com", None)
        .await
        .expect_err("Case variant of a taken email must conflict");
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn test_anonymous_profile_is_deterministic() {
    use textora_backend::services::profile;

    let db = TestDatabase::new().await;
    let user = db.identity.find_or_create_by_ip("203.0.113.77").await.unwrap();

    assert_eq!(
        user.username.as_deref(),
        Some(profile::username_for_seed("203.0.113.77").as_str())
    );
    assert_eq!(user.avatar_id, Some(profile::avatar_id_for_seed("203.0.113.77")));
}
