use utoipa::openapi::{Contact, InfoBuilder, License};
use utoipa::OpenApi;

use super::handlers::{health, login, register, retrieve, user};
use super::types;

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        login::login,
        login::verify,
        register::check,
        register::request_code,
        register::register,
        retrieve::check,
        retrieve::request_code,
        retrieve::retrieve,
        user::info,
        user::offline,
        user::offline_all,
        user::change_name,
        user::link_java_id,
        user::link_xbox_id,
        user::change_password,
    ),
    components(schemas(
        health::Health,
        types::ErrorResponse,
        types::MessageResponse,
        types::LoginRequest,
        types::LoginResponse,
        types::TokenRequest,
        types::LoginStatusResponse,
        types::CheckNameAndEmailRequest,
        types::CheckEmailRequest,
        types::ExistsResponse,
        types::RegistrationCodeRequest,
        types::RetrievalCodeRequest,
        types::RegisterRequest,
        types::RetrieveRequest,
        types::OfflineRequest,
        types::OfflineResponse,
        types::ChangeNameRequest,
        types::LinkGameIdRequest,
        types::ChangePasswordRequest,
        types::SessionView,
        types::AccountView,
    )),
    tags(
        (name = "health", description = "Service health"),
        (name = "login", description = "Login and login state"),
        (name = "register", description = "Account registration"),
        (name = "retrieve", description = "Password retrieval"),
        (name = "user", description = "Authenticated account operations"),
    )
)]
struct ApiDoc;

/// The `OpenAPI` document with its info block taken from Cargo metadata.
#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();
    info.contact = cargo_contact();
    info.license = cargo_license();
    doc.info = info;
    doc
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let authors = env!("CARGO_PKG_AUTHORS");
    let primary = authors.split(';').next().map(str::trim)?;
    if primary.is_empty() {
        return None;
    }

    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn optional_str(value: &'static str) -> Option<&'static str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    match author.split_once('<') {
        Some((name, email)) => {
            let name = name.trim();
            let email = email.trim_end_matches('>').trim();
            (
                (!name.is_empty()).then_some(name),
                (!email.is_empty()).then_some(email),
            )
        }
        None => {
            let name = author.trim();
            ((!name.is_empty()).then_some(name), None)
        }
    }
}
