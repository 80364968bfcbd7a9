use anyhow::Result;
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use school_admin::domain::models::Role;
use serde_json::Value;
use sqlx::PgPool;
use tower::ServiceExt;
use uuid::Uuid;


use test_harness::{
    bearer, remove_student, remove_user, run_test, seed_student, seed_user, test_app, test_state,
};

fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(raw) => raw.parse().expect("decimal string"),
        Value::Number(number) => number.to_string().parse().expect("decimal number"),
        other => panic!("not a decimal: {other}"),
    }
}

async fn send(app: &Router, request: Request<Body>) -> Result<(StatusCode, Value)> {
    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let body = to_bytes(response.into_body(), 1024 * 1024).await?;
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body)?
    };
    Ok((status, json))
}

fn post_json(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, token);
    }
    builder
        .body(Body::from(body.to_string()))
        .expect("failed to build request")
}

#[tokio::test]
async fn payment_routes_require_a_token() -> Result<()> {
    run_test(|pool: PgPool| async move {
        let state = test_state(&pool);
        let app = test_app(&state);

        let (status, body) = send(
            &app,
            post_json(
                "/api/fee-payments",
                None,
                serde_json::json!({ "student_id": Uuid::new_v4(), "month": "JAN" }),
            ),
        )
        .await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "missing authorization header");
        Ok(())
    })
    .await
}

#[tokio::test]
async fn recorded_total_is_always_the_sum_of_portions() -> Result<()> {
    run_test(|pool: PgPool| async move {
        let state = test_state(&pool);
        let app = test_app(&state);
        let staff = seed_user(&pool, Role::Staff).await?;
        let token = bearer(&state, &staff)?;
        let student_id = seed_student(&pool, "Payment Student", "2024-01-10").await?;

        let (status, body) = send(
            &app,
            post_json(
                "/api/fee-payments",
                Some(&token),
                serde_json::json!({
                    "student_id": student_id,
                    "month": "MAR",
                    "tuition_fees": "1000",
                    "auto_fees": "200",
                    "day_boarding_fees": "300",
                    "total_amount": "99999"
                }),
            ),
        )
        .await?;
        assert_eq!(status, StatusCode::OK, "{body}");
        let payment = &body["fee_payment"];
        assert_eq!(decimal(&payment["total_amount"]), dec!(1500));
        assert_eq!(payment["month"], "MAR");

        let payment_id = payment["id"].as_str().expect("payment id").to_string();
        let update = Request::builder()
            .method("PUT")
            .uri(format!("/api/fee-payments/{payment_id}"))
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, &token)
            .body(Body::from(
                serde_json::json!({ "auto_fees": "0", "total_amount": "1" }).to_string(),
            ))
            .expect("failed to build update request");
        let (status, body) = send(&app, update).await?;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(decimal(&body["fee_payment"]["total_amount"]), dec!(1300));

        let (status, _) = send(
            &app,
            post_json(
                "/api/fee-payments",
                Some(&token),
                serde_json::json!({
                    "student_id": student_id,
                    "month": "APR",
                    "tuition_fees": "-5"
                }),
            ),
        )
        .await?;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        remove_student(&pool, student_id).await?;
        remove_user(&pool, &staff).await?;
        Ok(())
    })
    .await
}

#[tokio::test]
async fn payments_for_unknown_students_are_not_found() -> Result<()> {
    run_test(|pool: PgPool| async move {
        let state = test_state(&pool);
        let app = test_app(&state);
        let staff = seed_user(&pool, Role::Staff).await?;
        let token = bearer(&state, &staff)?;

        let (status, _) = send(
            &app,
            post_json(
                "/api/fee-payments",
                Some(&token),
                serde_json::json!({
                    "student_id": Uuid::new_v4(),
                    "month": "JAN",
                    "tuition_fees": "100"
                }),
            ),
        )
        .await?;
        assert_eq!(status, StatusCode::NOT_FOUND);

        remove_user(&pool, &staff).await?;
        Ok(())
    })
    .await
}
