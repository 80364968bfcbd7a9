use anyhow::Result;
use school_admin::{
    domain::models::Role,
    services::{
        academic_years::{AcademicYearService, CreateYearRequest, UpdateYearRequest},
        errors::ServiceError,
    },
};
use serial_test::serial;
use sqlx::PgPool;
use uuid::Uuid;


use test_harness::{actor, remove_user, run_test, seed_user, test_state, unique_year_label};

async fn active_ids(pool: &PgPool) -> Result<Vec<Uuid>> {
    Ok(
        sqlx::query_scalar::<_, Uuid>("SELECT id FROM academic_years WHERE is_active")
            .fetch_all(pool)
            .await?,
    )
}

async fn restore_active(pool: &PgPool, previous: Option<Uuid>) -> Result<()> {
    sqlx::query("UPDATE academic_years SET is_active = FALSE WHERE is_active")
        .execute(pool)
        .await?;
    if let Some(id) = previous {
        sqlx::query("UPDATE academic_years SET is_active = TRUE WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
    }
    Ok(())
}

async fn remove_years(pool: &PgPool, ids: &[Uuid]) -> Result<()> {
    sqlx::query("DELETE FROM academic_years WHERE id = ANY($1)")
        .bind(ids)
        .execute(pool)
        .await?;
    Ok(())
}

#[tokio::test]
#[serial]
async fn activation_leaves_exactly_one_active_year() -> Result<()> {
    run_test(|pool| async move {
        let state = test_state(&pool);
        let admin = seed_user(&pool, Role::Admin).await?;
        let service = AcademicYearService::new(state);
        let previous = active_ids(&pool).await?.first().copied();

        let first = service
            .create(&actor(&admin), CreateYearRequest { year: unique_year_label() })
            .await?;
        let second = service
            .create(&actor(&admin), CreateYearRequest { year: unique_year_label() })
            .await?;
        assert!(!first.is_active);
        assert!(!second.is_active);

        service.activate(&actor(&admin), first.id).await?;
        assert_eq!(active_ids(&pool).await?, vec![first.id]);

        let activated = service.activate(&actor(&admin), second.id).await?;
        assert!(activated.is_active);
        assert_eq!(active_ids(&pool).await?, vec![second.id]);
        assert!(!service.get(first.id).await?.is_active);

        // Re-activating the active year is a no-op.
        service.activate(&actor(&admin), second.id).await?;
        assert_eq!(active_ids(&pool).await?, vec![second.id]);

        restore_active(&pool, previous).await?;
        remove_years(&pool, &[first.id, second.id]).await?;
        remove_user(&pool, &admin).await?;
        Ok(())
    })
    .await
}

#[tokio::test]
#[serial]
async fn concurrent_activations_serialise() -> Result<()> {
    run_test(|pool| async move {
        let state = test_state(&pool);
        let admin = seed_user(&pool, Role::Admin).await?;
        let previous = active_ids(&pool).await?.first().copied();
        let service = AcademicYearService::new(state.clone());

        let a = service
            .create(&actor(&admin), CreateYearRequest { year: unique_year_label() })
            .await?;
        let b = service
            .create(&actor(&admin), CreateYearRequest { year: unique_year_label() })
            .await?;

        let left = AcademicYearService::new(state.clone());
        let right = AcademicYearService::new(state.clone());
        let user = actor(&admin);
        let (left_result, right_result) =
            tokio::join!(left.activate(&user, a.id), right.activate(&user, b.id));
        left_result?;
        right_result?;

        let active = active_ids(&pool).await?;
        assert_eq!(active.len(), 1);
        assert!(active[0] == a.id || active[0] == b.id);

        restore_active(&pool, previous).await?;
        remove_years(&pool, &[a.id, b.id]).await?;
        remove_user(&pool, &admin).await?;
        Ok(())
    })
    .await
}

#[tokio::test]
#[serial]
async fn guard_failures_leave_state_untouched() -> Result<()> {
    run_test(|pool| async move {
        let state = test_state(&pool);
        let admin = seed_user(&pool, Role::Admin).await?;
        let staff = seed_user(&pool, Role::Staff).await?;
        let service = AcademicYearService::new(state);
        let before = active_ids(&pool).await?;

        let missing = service.activate(&actor(&admin), Uuid::new_v4()).await;
        assert!(matches!(missing, Err(ServiceError::NotFound(_))));
        assert_eq!(active_ids(&pool).await?, before);

        let year = service
            .create(&actor(&admin), CreateYearRequest { year: unique_year_label() })
            .await?;

        let forbidden = service.activate(&actor(&staff), year.id).await;
        assert!(matches!(forbidden, Err(ServiceError::Forbidden)));

        let inactive = service.deactivate(&actor(&admin), year.id).await;
        assert!(matches!(inactive, Err(ServiceError::Conflict(_))));

        let missing = service.deactivate(&actor(&admin), Uuid::new_v4()).await;
        assert!(matches!(missing, Err(ServiceError::NotFound(_))));
        assert_eq!(active_ids(&pool).await?, before);

        remove_years(&pool, &[year.id]).await?;
        remove_user(&pool, &admin).await?;
        remove_user(&pool, &staff).await?;
        Ok(())
    })
    .await
}

#[tokio::test]
#[serial]
async fn labels_are_unique_and_updates_may_keep_their_own() -> Result<()> {
    run_test(|pool| async move {
        let state = test_state(&pool);
        let admin = seed_user(&pool, Role::Admin).await?;
        let service = AcademicYearService::new(state);

        let label = unique_year_label();
        let year = service
            .create(&actor(&admin), CreateYearRequest { year: label.clone() })
            .await?;

        let duplicate = service
            .create(&actor(&admin), CreateYearRequest { year: label.clone() })
            .await;
        assert!(matches!(duplicate, Err(ServiceError::Conflict(_))));

        let malformed = service
            .create(&actor(&admin), CreateYearRequest { year: "2024-2026".into() })
            .await;
        assert!(matches!(malformed, Err(ServiceError::Validation(_))));

        let unchanged = service
            .update(&actor(&admin), year.id, UpdateYearRequest { year: Some(label.clone()) })
            .await?;
        assert_eq!(unchanged.year, label);

        let other = service
            .create(&actor(&admin), CreateYearRequest { year: unique_year_label() })
            .await?;
        let clash = service
            .update(&actor(&admin), other.id, UpdateYearRequest { year: Some(label.clone()) })
            .await;
        assert!(matches!(clash, Err(ServiceError::Conflict(_))));

        service.delete(&actor(&admin), other.id).await?;
        assert!(matches!(
            service.get(other.id).await,
            Err(ServiceError::NotFound(_))
        ));

        remove_years(&pool, &[year.id]).await?;
        remove_user(&pool, &admin).await?;
        Ok(())
    })
    .await
}
