// src/utils.rs
use std::fmt;
use std::net::IpAddr;

use actix_web::{HttpRequest, HttpResponse, ResponseError};
use governor::clock::DefaultClock;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::RateLimiter;
use log::debug;

use crate::error::{ConfigError, LookupError};

pub type IpRateLimiter = RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>;

#[derive(Debug)]
pub enum RequestError {
    MissingPeerIP,
    RateLimitExceeded,
    NotFound(LookupError),
    RefreshDenied,
    Config(String),
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingPeerIP => write!(f, "Failed to extract client IP"),
            Self::RateLimitExceeded => write!(f, "Rate limit exceeded"),
            Self::NotFound(e) => write!(f, "{}", e),
            Self::RefreshDenied => write!(f, "Missing or invalid refresh token"),
            Self::Config(e) => write!(f, "Failed to reload: {}", e),
        }
    }
}

impl ResponseError for RequestError {
    fn error_response(&self) -> HttpResponse {
        match self {
            Self::RateLimitExceeded => HttpResponse::TooManyRequests().body(self.to_string()),
            Self::NotFound(_) => HttpResponse::NotFound().body(self.to_string()),
            Self::RefreshDenied => HttpResponse::Forbidden().body(self.to_string()),
            Self::Config(_) => HttpResponse::InternalServerError().body(self.to_string()),
            Self::MissingPeerIP => HttpResponse::BadRequest().body(self.to_string()),
        }
    }
}

impl From<LookupError> for RequestError {
    fn from(e: LookupError) -> Self {
        Self::NotFound(e)
    }
}

impl From<ConfigError> for RequestError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}

pub fn peer_ip(req: &HttpRequest) -> Result<IpAddr, RequestError> {
    let ip = req
        .peer_addr()
        .map(|addr| addr.ip())
        .ok_or(RequestError::MissingPeerIP)?;
    debug!("Request from {}", ip);
    Ok(ip)
}

pub fn check_rate(limiter: &IpRateLimiter, ip: IpAddr) -> Result<(), RequestError> {
    if limiter.check_key(&ip).is_err() {
        log::error!("Rate limit exceeded for query from ip: {}", ip);
        return Err(RequestError::RateLimitExceeded);
    }
    Ok(())
}
