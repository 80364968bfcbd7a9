use anyhow::Result;
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use school_admin::{domain::models::Role, services::dashboard::DashboardService};
use serde_json::Value;
use sqlx::PgPool;
use tower::ServiceExt;
use uuid::Uuid;


use test_harness::{
    bearer, remove_student, remove_user, run_test, seed_student, seed_user, test_app, test_state,
};

async fn record_payment(
    pool: &PgPool,
    student_id: Uuid,
    tuition: i64,
    transport: i64,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO fee_payments (id, student_id, month, tuition_fees, auto_fees,
             day_boarding_fees, total_amount)
         VALUES ($1,$2,'JAN',$3,$4,0,$3 + $4)",
    )
    .bind(Uuid::new_v4())
    .bind(student_id)
    .bind(tuition)
    .bind(transport)
    .execute(pool)
    .await?;
    Ok(())
}

async fn get_fees(app: &Router, uri: &str, token: Option<&str>) -> Result<(StatusCode, Value)> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, token);
    }
    let response = app.clone().oneshot(builder.body(Body::empty())?).await?;
    let status = response.status();
    let body = to_bytes(response.into_body(), 4 * 1024 * 1024).await?;
    Ok((status, serde_json::from_slice(&body)?))
}

fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(raw) => raw.parse().expect("decimal string"),
        Value::Number(number) => number.to_string().parse().expect("decimal number"),
        other => panic!("not a decimal: {other}"),
    }
}

#[tokio::test]
async fn malformed_records_are_skipped_without_failing_the_batch() -> Result<()> {
    run_test(|pool| async move {
        let state = test_state(&pool);
        let good = seed_student(&pool, "Reconcile Good", "2024-01-15").await?;
        let bad = seed_student(&pool, "Reconcile Bad", "15/01/2024").await?;
        let boarder = seed_student(&pool, "Reconcile Boarder", "2024-01-15").await?;
        record_payment(&pool, good, 1000, 200).await?;

        let intervals = [
            ("2024-01-01", Some("2024-02-29"), 500),
            ("2024-03-01", None, 700),
        ];
        for (start, end, fee) in intervals {
            sqlx::query(
                "INSERT INTO day_boarding_history
                     (id, student_id, start_date, end_date, day_boarding_fees)
                 VALUES ($1,$2,$3::date,$4::date,$5)",
            )
            .bind(Uuid::new_v4())
            .bind(boarder)
            .bind(start)
            .bind(end)
            .bind(fee)
            .execute(&pool)
            .await?;
        }

        let as_of = NaiveDate::from_ymd_opt(2024, 4, 30).expect("valid date");
        let report = DashboardService::new(state).reconcile(Some(as_of)).await?;

        let good_summary = report
            .summaries
            .iter()
            .find(|s| s.student_id == good)
            .expect("good student reconciled");
        assert_eq!(good_summary.expected_amount, dec!(4800));
        assert_eq!(good_summary.paid_amount, dec!(1200));
        assert_eq!(good_summary.due_amount, dec!(3600));

        let boarder_summary = report
            .summaries
            .iter()
            .find(|s| s.student_id == boarder)
            .expect("boarder reconciled");
        assert_eq!(boarder_summary.expected_amount, dec!(7200));

        assert!(report.summaries.iter().all(|s| s.student_id != bad));
        let skipped = report
            .skipped
            .iter()
            .find(|s| s.student_id == bad)
            .expect("bad student skipped");
        assert!(skipped.reason.contains("enrollment date"));

        for id in [good, bad, boarder] {
            remove_student(&pool, id).await?;
        }
        Ok(())
    })
    .await
}

#[tokio::test]
async fn fee_dashboard_route_parses_as_of() -> Result<()> {
    run_test(|pool: PgPool| async move {
        let state = test_state(&pool);
        let app = test_app(&state);
        let staff = seed_user(&pool, Role::Staff).await?;
        let token = bearer(&state, &staff)?;
        let student = seed_student(&pool, "Dashboard Route", "2024-01-15").await?;

        let (status, body) = get_fees(&app, "/api/dashboard/fees?as_of=2024-04-30", None).await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "missing authorization header");

        let (status, body) =
            get_fees(&app, "/api/dashboard/fees?as_of=2024-04-30", Some(&token)).await?;
        assert_eq!(status, StatusCode::OK);
        let report = &body["report"];
        assert_eq!(report["asOf"], "2024-04-30");
        let summary = report["summaries"]
            .as_array()
            .expect("summaries array")
            .iter()
            .find(|s| s["studentId"] == student.to_string())
            .expect("seeded student reconciled");
        // Jan..Apr at 1000 tuition + 200 transport, nothing paid.
        assert_eq!(decimal(&summary["expectedAmount"]), dec!(4800));
        assert_eq!(decimal(&summary["dueAmount"]), dec!(4800));

        let (status, body) =
            get_fees(&app, "/api/dashboard/fees?as_of=not-a-date", Some(&token)).await?;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"]
            .as_str()
            .is_some_and(|msg| msg.contains("as_of")));

        remove_student(&pool, student).await?;
        remove_user(&pool, &staff).await?;
        Ok(())
    })
    .await
}
