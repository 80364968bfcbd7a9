use anyhow::Result;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use school_admin::{
    domain::models::{Role, StudentStatus},
    services::{
        errors::ServiceError,
        students::{CreateStudentRequest, StudentService, UpdateStudentRequest},
    },
};
use uuid::Uuid;


use test_harness::{
    actor, remove_student, remove_user, run_test, seed_student, seed_user, test_state,
};

fn enrollment(name: &str, day_boarding_fees: Decimal) -> CreateStudentRequest {
    CreateStudentRequest {
        name: name.to_string(),
        roll_number: None,
        father_name: None,
        mother_name: None,
        date_of_birth: "2016-04-12".to_string(),
        contact: Some("555-0101".to_string()),
        address: None,
        enrollment_date: "2024-01-15".to_string(),
        tuition_fees: dec!(1000),
        auto_fees: dec!(200),
        day_boarding_fees,
        class_id: None,
        section_id: None,
        academic_year_id: None,
    }
}

#[tokio::test]
async fn fee_changes_close_and_reopen_the_interval() -> Result<()> {
    run_test(|pool| async move {
        let state = test_state(&pool);
        let staff = seed_user(&pool, Role::Staff).await?;
        let service = StudentService::new(state);

        let created = service
            .create(&actor(&staff), enrollment("Boarding Student", dec!(500)))
            .await?;
        let id = created.student.id;
        assert_eq!(created.day_boarding_fees, dec!(500));
        assert_eq!(service.history(id).await?.len(), 1);

        let raised = service
            .update(
                &actor(&staff),
                id,
                UpdateStudentRequest {
                    day_boarding_fees: Some(dec!(700)),
                    ..Default::default()
                },
            )
            .await?;
        assert_eq!(raised.day_boarding_fees, dec!(700));
        let history = service.history(id).await?;
        assert_eq!(history.len(), 2);
        assert_eq!(history.iter().filter(|h| h.end_date.is_none()).count(), 1);
        assert_eq!(service.get(id).await?.day_boarding_fees, dec!(700));

        // Same fee again writes nothing.
        service
            .update(
                &actor(&staff),
                id,
                UpdateStudentRequest {
                    day_boarding_fees: Some(dec!(700)),
                    ..Default::default()
                },
            )
            .await?;
        assert_eq!(service.history(id).await?.len(), 2);

        let stopped = service
            .update(
                &actor(&staff),
                id,
                UpdateStudentRequest {
                    day_boarding_fees: Some(Decimal::ZERO),
                    ..Default::default()
                },
            )
            .await?;
        assert_eq!(stopped.day_boarding_fees, Decimal::ZERO);
        let history = service.history(id).await?;
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|h| h.end_date.is_some()));

        remove_student(&pool, id).await?;
        remove_user(&pool, &staff).await?;
        Ok(())
    })
    .await
}

#[tokio::test]
async fn drop_out_ends_boarding_and_delete_is_soft() -> Result<()> {
    run_test(|pool| async move {
        let state = test_state(&pool);
        let admin = seed_user(&pool, Role::Admin).await?;
        let staff = seed_user(&pool, Role::Staff).await?;
        let service = StudentService::new(state);

        let created = service
            .create(&actor(&staff), enrollment("Leaving Student", dec!(400)))
            .await?;
        let id = created.student.id;

        let dropped = service.drop_out(&actor(&staff), id).await?;
        assert_eq!(dropped.status, StudentStatus::DroppedOff);
        assert!(service
            .history(id)
            .await?
            .iter()
            .all(|h| h.end_date.is_some()));

        let forbidden = service.delete(&actor(&staff), id).await;
        assert!(matches!(forbidden, Err(ServiceError::Forbidden)));

        service.delete(&actor(&admin), id).await?;
        let deleted = service.get(id).await?;
        assert_eq!(deleted.student.status, StudentStatus::Deleted);

        remove_student(&pool, id).await?;
        remove_user(&pool, &admin).await?;
        remove_user(&pool, &staff).await?;
        Ok(())
    })
    .await
}

#[tokio::test]
async fn enrollment_validates_dates_and_fees() -> Result<()> {
    run_test(|pool| async move {
        let state = test_state(&pool);
        let staff = seed_user(&pool, Role::Staff).await?;
        let service = StudentService::new(state);

        let mut born_late = enrollment("Invalid Student", Decimal::ZERO);
        born_late.date_of_birth = "2024-02-01".to_string();
        assert!(matches!(
            service.create(&actor(&staff), born_late).await,
            Err(ServiceError::Validation(_))
        ));

        let mut bad_date = enrollment("Invalid Student", Decimal::ZERO);
        bad_date.enrollment_date = "15-01-2024".to_string();
        assert!(matches!(
            service.create(&actor(&staff), bad_date).await,
            Err(ServiceError::Validation(_))
        ));

        let mut negative = enrollment("Invalid Student", Decimal::ZERO);
        negative.tuition_fees = dec!(-1);
        assert!(matches!(
            service.create(&actor(&staff), negative).await,
            Err(ServiceError::Validation(_))
        ));

        let mut oversized = enrollment("Invalid Student", Decimal::ZERO);
        oversized.tuition_fees = dec!(100000000);
        assert!(matches!(
            service.create(&actor(&staff), oversized).await,
            Err(ServiceError::Validation(msg)) if msg.contains("tuition_fees")
        ));

        let existing = seed_student(&pool, "Capped Student", "2024-01-15").await?;
        let raise = service
            .update(
                &actor(&staff),
                existing,
                UpdateStudentRequest {
                    day_boarding_fees: Some(dec!(1000000.01)),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(
            raise,
            Err(ServiceError::Validation(msg)) if msg.contains("day_boarding_fees")
        ));
        assert!(service.history(existing).await?.is_empty());
        remove_student(&pool, existing).await?;

        assert!(matches!(
            service.get(Uuid::new_v4()).await,
            Err(ServiceError::NotFound(_))
        ));

        remove_user(&pool, &staff).await?;
        Ok(())
    })
    .await
}
