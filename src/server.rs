//! HTTP surface: thin actix-web handlers over [`RateService`].
//!
//! `/api/currency/rates` reports degraded data in-band and always answers
//! 200; `/api/currency/convert` owns input validation (400) and is the only
//! path that can fail outright (500).

use actix_web::{HttpResponse, web};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

use crate::currency::{BASE_CURRENCY, Currency, RateTable};
use crate::service::{RateService, RatesView};

#[derive(Debug, Serialize)]
struct RatesResponse {
    base: &'static str,
    rates: RateTable,
    cached: bool,
    #[serde(rename = "lastUpdate")]
    last_update: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'static str>,
}

impl From<RatesView> for RatesResponse {
    fn from(view: RatesView) -> Self {
        RatesResponse {
            base: BASE_CURRENCY.code(),
            rates: view.rates,
            cached: view.cached,
            last_update: view.last_update.to_rfc3339_opts(SecondsFormat::Millis, true),
            error: view.note.map(|note| note.message()),
        }
    }
}

#[derive(Debug, Serialize)]
struct Money {
    amount: f64,
    currency: &'static str,
}

#[derive(Debug, Serialize)]
struct ConvertResponse {
    original: Money,
    converted: Money,
    rate: f64,
}

#[derive(Debug, Deserialize)]
pub struct ConvertQuery {
    amount: Option<String>,
    to: Option<String>,
}

pub async fn get_rates(service: web::Data<RateService>) -> HttpResponse {
    let view = service.get_rates(Utc::now()).await;
    HttpResponse::Ok().json(RatesResponse::from(view))
}

pub async fn convert(
    service: web::Data<RateService>,
    query: web::Query<ConvertQuery>,
) -> HttpResponse {
    let (Some(amount), Some(to)) = (query.amount.as_deref(), query.to.as_deref()) else {
        return HttpResponse::BadRequest().json(json!({
            "error": "Bad Request",
            "details": ["amount and to currency required"]
        }));
    };

    let amount = match amount.parse::<f64>() {
        Ok(value) if value.is_finite() => value,
        _ => {
            return HttpResponse::BadRequest().json(json!({ "error": "Invalid amount" }));
        }
    };

    let to = match to.parse::<Currency>() {
        Ok(currency) => currency,
        Err(_) => {
            return HttpResponse::BadRequest().json(json!({
                "error": "Invalid currency",
                "supported": Currency::supported_codes()
            }));
        }
    };

    match service.convert(amount, to, Utc::now()).await {
        Ok(conversion) => HttpResponse::Ok().json(ConvertResponse {
            original: Money {
                amount: conversion.amount,
                currency: BASE_CURRENCY.code(),
            },
            converted: Money {
                amount: conversion.converted,
                currency: conversion.currency.code(),
            },
            rate: conversion.rate,
        }),
        Err(err) => {
            error!(error = %err, "Conversion failed");
            HttpResponse::InternalServerError().json(json!({ "error": "Conversion failed" }))
        }
    }
}

pub async fn api_info() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "message": "Dealership currency API is running",
        "version": env!("CARGO_PKG_VERSION"),
        "features": ["Rates", "Currency Converter"]
    }))
}

pub async fn not_found() -> HttpResponse {
    HttpResponse::NotFound().json(json!({ "error": "API route not found" }))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/api", web::get().to(api_info)).service(
        web::scope("/api/currency")
            .route("/rates", web::get().to(get_rates))
            .route("/convert", web::get().to(convert)),
    );
}
