use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use rdpstore_checkout::{CheckoutError, FieldErrors};
use rdpstore_core::DomainError;
use rdpstore_infra::store::StoreError;
use rdpstore_infra::{AdminError, FulfillmentError, LifecycleError, ReconcileError};

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn field_errors(errors: &FieldErrors) -> axum::response::Response {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        axum::Json(json!({
            "error": "validation_error",
            "message": errors.to_string(),
            "fields": errors,
        })),
    )
        .into_response()
}

pub fn invalid_id(what: &str) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid {what} id"))
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    match err {
        DomainError::Validation(msg) => json_error(StatusCode::UNPROCESSABLE_ENTITY, "validation_error", msg),
        DomainError::InvalidId(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_id", msg),
    }
}

pub fn store_error_to_response(err: StoreError) -> axum::response::Response {
    match err {
        StoreError::NotFound { .. } => json_error(StatusCode::NOT_FOUND, "not_found", err.to_string()),
        StoreError::Conflict { .. } | StoreError::AlreadyExists { .. } => {
            json_error(StatusCode::CONFLICT, "conflict", err.to_string())
        }
        StoreError::Unavailable(_) => {
            tracing::error!(error = %err, "store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", err.to_string())
        }
    }
}

pub fn fulfillment_error_to_response(err: FulfillmentError) -> axum::response::Response {
    match err {
        FulfillmentError::EmptyCart => json_error(StatusCode::BAD_REQUEST, "empty_cart", err.to_string()),
        FulfillmentError::Domain(e) => domain_error_to_response(e),
        FulfillmentError::Store(e) => store_error_to_response(e),
    }
}

pub fn checkout_error_to_response(err: CheckoutError) -> axum::response::Response {
    match err {
        CheckoutError::Validation(fields) => field_errors(&fields),
        CheckoutError::EmptyCart => json_error(StatusCode::BAD_REQUEST, "empty_cart", err.to_string()),
        CheckoutError::UnorderableCart(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "validation_error", msg)
        }
        CheckoutError::PaymentRejected { reason } => {
            json_error(StatusCode::PAYMENT_REQUIRED, "payment_rejected", reason)
        }
        CheckoutError::AuthorizerUnavailable(msg) => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, "authorizer_unavailable", msg)
        }
        CheckoutError::InvalidStep { .. } | CheckoutError::StaleTicket => {
            json_error(StatusCode::CONFLICT, "invalid_step", err.to_string())
        }
        CheckoutError::Fulfillment(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "fulfillment_failed", msg)
        }
    }
}

pub fn lifecycle_error_to_response(err: LifecycleError) -> axum::response::Response {
    match err {
        LifecycleError::NotFound(_) => json_error(StatusCode::NOT_FOUND, "not_found", err.to_string()),
        LifecycleError::Forbidden { .. } => json_error(StatusCode::FORBIDDEN, "forbidden", err.to_string()),
        LifecycleError::IllegalTransition(_) => {
            json_error(StatusCode::CONFLICT, "illegal_transition", err.to_string())
        }
        LifecycleError::Conflict { .. } => json_error(StatusCode::CONFLICT, "conflict", err.to_string()),
        LifecycleError::Validation(e) => domain_error_to_response(e),
        LifecycleError::Store(e) => store_error_to_response(e),
        LifecycleError::Interrupted(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "interrupted", msg)
        }
    }
}

pub fn admin_error_to_response(err: AdminError) -> axum::response::Response {
    match err {
        AdminError::NotFound(_) => json_error(StatusCode::NOT_FOUND, "not_found", err.to_string()),
        AdminError::ProvisioningInProgress(_) => {
            json_error(StatusCode::CONFLICT, "provisioning_in_progress", err.to_string())
        }
        AdminError::NotProvisioned(_) => {
            json_error(StatusCode::CONFLICT, "not_provisioned", err.to_string())
        }
        AdminError::Conflict { .. } => json_error(StatusCode::CONFLICT, "conflict", err.to_string()),
        AdminError::Fulfillment(e) => fulfillment_error_to_response(e),
        AdminError::Domain(e) => domain_error_to_response(e),
        AdminError::Store(e) => store_error_to_response(e),
    }
}

pub fn reconcile_error_to_response(err: ReconcileError) -> axum::response::Response {
    match err {
        ReconcileError::NotFound(_) => json_error(StatusCode::NOT_FOUND, "not_found", err.to_string()),
        ReconcileError::NotClaimed(_) => json_error(StatusCode::CONFLICT, "not_claimed", err.to_string()),
        ReconcileError::TooRecent(_) => json_error(StatusCode::CONFLICT, "too_recent", err.to_string()),
        ReconcileError::InProgress(_) => {
            json_error(StatusCode::CONFLICT, "reconciliation_in_progress", err.to_string())
        }
        ReconcileError::Fulfillment(e) => fulfillment_error_to_response(e),
        ReconcileError::Store(e) => store_error_to_response(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rdpstore_core::InstanceId;
    use rdpstore_provisioning::{InstanceStatus, LifecycleAction};

    #[test]
    fn taxonomy_maps_to_status_codes() {
        let rejected = CheckoutError::PaymentRejected {
            reason: "card declined".to_string(),
        };
        assert_eq!(checkout_error_to_response(rejected).status(), StatusCode::PAYMENT_REQUIRED);

        let illegal = LifecycleAction::Restart
            .apply(InstanceStatus::Expired)
            .unwrap_err();
        assert_eq!(
            lifecycle_error_to_response(illegal.into()).status(),
            StatusCode::CONFLICT
        );

        assert_eq!(
            lifecycle_error_to_response(LifecycleError::NotFound(InstanceId::new())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            store_error_to_response(StoreError::Unavailable("down".to_string())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            domain_error_to_response(DomainError::validation("bad")).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }
}
