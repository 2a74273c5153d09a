//! This endpoint is called by services to learn who a ticket belongs to.

use super::*;
use crate::error::StoreError;
use crate::store::TicketBinding;
use crate::*;
use quick_xml::escape::escape;
use rocket::form::Form;
use rocket::{get, post};

pub const CAS_NAMESPACE: &str = "http://www.yale.edu/tp/cas";

/// Result of one ticket lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Valid(TicketBinding),
    /// No ticket was supplied.
    Missing,
    /// Unknown, expired or already used.
    Unknown,
    ServiceMismatch { expected: String },
}

pub struct Validator {
    store: Arc<dyn TicketStore>,
    single_use: bool,
}

impl Validator {
    pub fn new(store: Arc<dyn TicketStore>, single_use: bool) -> Self {
        Validator { store, single_use }
    }

    /// Touches the store exactly once. With single-use tickets the binding
    /// is consumed, even when the service turns out not to match.
    pub async fn lookup(&self, ticket: Option<&str>, service: Option<&str>) -> Result<Lookup, StoreError> {
        let ticket = match ticket {
            None | Some("") => return Ok(Lookup::Missing),
            Some(ticket) => ticket,
        };

        let binding = if self.single_use {
            self.store.take(ticket).await?
        } else {
            self.store.get(ticket).await?
        };

        let lookup = match binding {
            None => Lookup::Unknown,
            Some(binding) => match service {
                Some(service) if !service.is_empty() && service != binding.service => Lookup::ServiceMismatch {
                    expected: binding.service,
                },
                _ => Lookup::Valid(binding),
            },
        };
        match &lookup {
            Lookup::Valid(binding) => tracing::info!(user = %binding.username, "ticket validated"),
            other => tracing::info!(outcome = ?other, "ticket rejected"),
        }
        Ok(lookup)
    }
}

pub fn render_success(username: &str) -> String {
    let user = escape(username);
    format!(
        "<cas:serviceResponse xmlns:cas=\"{CAS_NAMESPACE}\">\n\
         <cas:authenticationSuccess>\n\
         <cas:user>{user}</cas:user>\n\
         </cas:authenticationSuccess>\n\
         </cas:serviceResponse>\n"
    )
}

pub fn render_failure(code: &str, message: &str) -> String {
    let message = escape(message);
    format!(
        "<cas:serviceResponse xmlns:cas=\"{CAS_NAMESPACE}\">\n\
         <cas:authenticationFailure code=\"{code}\">\n\
         {message}\n\
         </cas:authenticationFailure>\n\
         </cas:serviceResponse>\n"
    )
}

/// Legacy CAS 1.0 answer; cannot tell the service who the user is.
pub enum ProviderValidateResponse {
    Yes,
    No,
    StoreFailure,
}

impl<'r, 'o: 'r> Responder<'r, 'o> for ProviderValidateResponse {
    fn respond_to(self, _: &'r rocket::Request<'_>) -> rocket::response::Result<'o> {
        match self {
            ProviderValidateResponse::Yes => plain_text(Status::Ok, String::from("yes\n")),
            ProviderValidateResponse::No => plain_text(Status::Ok, String::from("no\n")),
            ProviderValidateResponse::StoreFailure => plain_text(Status::InternalServerError, String::from("no")),
        }
    }
}

pub enum ProviderServiceValidateResponse {
    Ok(TicketBinding),
    InvalidRequest,
    TicketDoesNotExist(String),
    ServiceMismatch { expected: String, got: String },
    StoreFailure,
}

impl<'r, 'o: 'r> Responder<'r, 'o> for ProviderServiceValidateResponse {
    fn respond_to(self, _: &'r rocket::Request<'_>) -> rocket::response::Result<'o> {
        let (status, body) = match self {
            ProviderServiceValidateResponse::Ok(binding) => (Status::Ok, render_success(&binding.username)),
            ProviderServiceValidateResponse::InvalidRequest => (
                Status::Ok,
                render_failure("INVALID_REQUEST", "Both ticket and service parameters are required"),
            ),
            ProviderServiceValidateResponse::TicketDoesNotExist(ticket) => (
                Status::Ok,
                render_failure("INVALID_TICKET", &format!("Ticket {ticket} not recognized")),
            ),
            ProviderServiceValidateResponse::ServiceMismatch { expected, got } => (
                Status::Ok,
                render_failure("INVALID_SERVICE", &format!("Service mismatch: expected {expected}, got {got}")),
            ),
            ProviderServiceValidateResponse::StoreFailure => (
                Status::InternalServerError,
                render_failure("INTERNAL_ERROR", "Ticket validation is temporarily unavailable"),
            ),
        };
        Ok(Response::build()
            .status(status)
            .header(Header::new("Content-Type", "text/xml"))
            .sized_body(body.len(), Cursor::new(body))
            .finalize())
    }
}

async fn validate(provider: &Provider, ticket: Option<String>, service: Option<String>) -> ProviderValidateResponse {
    match provider.validator.lookup(ticket.as_deref(), service.as_deref()).await {
        Ok(Lookup::Valid(_)) => ProviderValidateResponse::Yes,
        Ok(_) => ProviderValidateResponse::No,
        Err(e) => {
            tracing::error!(error = %e, "ticket store lookup failed");
            ProviderValidateResponse::StoreFailure
        }
    }
}

async fn service_validate(
    provider: &Provider,
    ticket: Option<String>,
    service: Option<String>,
) -> ProviderServiceValidateResponse {
    match provider.validator.lookup(ticket.as_deref(), service.as_deref()).await {
        Ok(Lookup::Valid(binding)) => ProviderServiceValidateResponse::Ok(binding),
        Ok(Lookup::Missing) => ProviderServiceValidateResponse::InvalidRequest,
        Ok(Lookup::Unknown) => ProviderServiceValidateResponse::TicketDoesNotExist(ticket.unwrap_or_default()),
        Ok(Lookup::ServiceMismatch { expected }) => ProviderServiceValidateResponse::ServiceMismatch {
            expected,
            got: service.unwrap_or_default(),
        },
        Err(e) => {
            tracing::error!(error = %e, "ticket store lookup failed");
            ProviderServiceValidateResponse::StoreFailure
        }
    }
}

fn merge(ticket: Option<String>, service: Option<String>, form: Option<Form<CasParams>>) -> (Option<String>, Option<String>) {
    let form = form.map(Form::into_inner).unwrap_or_default();
    (ticket.or(form.ticket), service.or(form.service))
}

#[get("/cas/validate?<ticket>&<service>")]
pub async fn provider_validate(
    provider: &State<Provider>,
    ticket: Option<String>,
    service: Option<String>,
) -> ProviderValidateResponse {
    validate(provider, ticket, service).await
}

#[post("/cas/validate?<ticket>&<service>", data = "<form>")]
pub async fn provider_validate_form(
    provider: &State<Provider>,
    ticket: Option<String>,
    service: Option<String>,
    form: Option<Form<CasParams>>,
) -> ProviderValidateResponse {
    let (ticket, service) = merge(ticket, service, form);
    validate(provider, ticket, service).await
}

#[get("/cas/serviceValidate?<ticket>&<service>")]
pub async fn provider_service_validate(
    provider: &State<Provider>,
    ticket: Option<String>,
    service: Option<String>,
) -> ProviderServiceValidateResponse {
    service_validate(provider, ticket, service).await
}

#[post("/cas/serviceValidate?<ticket>&<service>", data = "<form>")]
pub async fn provider_service_validate_form(
    provider: &State<Provider>,
    ticket: Option<String>,
    service: Option<String>,
    form: Option<Form<CasParams>>,
) -> ProviderServiceValidateResponse {
    let (ticket, service) = merge(ticket, service, form);
    service_validate(provider, ticket, service).await
}
