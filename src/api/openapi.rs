use super::handlers::{auth, health};
use utoipa::openapi::{Contact, InfoBuilder, License, OpenApiBuilder, Tag};
use utoipa_axum::{router::OpenApiRouter, routes};

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Router that also drives the `OpenAPI` document.
///
/// Endpoints registered with `.routes(routes!(...))` are both served and
/// documented. `OPTIONS /health` is added outside and stays undocumented.
pub(crate) fn api_router() -> OpenApiRouter {
    let mut router = OpenApiRouter::with_openapi(cargo_openapi())
        .routes(routes!(health::health))
        .routes(routes!(auth::login::login))
        .routes(routes!(auth::refresh::refresh))
        .routes(routes!(auth::session::logout))
        .routes(routes!(auth::session::logout_all))
        .routes(routes!(auth::session::session))
        .routes(routes!(auth::session::sessions))
        .routes(routes!(auth::admin::unlock_account));

    let mut rentgate_tag = Tag::new("rentgate");
    rentgate_tag.description = Some("Authentication and session lifecycle API".to_string());

    let mut auth_tag = Tag::new("auth");
    auth_tag.description = Some("Login, token refresh, logout and session lookup".to_string());

    let mut health_tag = Tag::new("health");
    health_tag.description = Some("Store and database probes".to_string());

    router.get_openapi_mut().tags = Some(vec![rentgate_tag, auth_tag, health_tag]);

    router
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = cargo_contact();
    info.license = cargo_license();

    OpenApiBuilder::new().info(info).build()
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
    Some(value.trim()).filter(|trimmed| !trimmed.is_empty())
}

fn non_empty(value: &str) -> Option<&str> {
    Some(value).filter(|value| !value.is_empty())
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    match author.split_once('<') {
        Some((name, email)) => (
            non_empty(name.trim()),
            non_empty(email.trim_end_matches('>').trim()),
        ),
        None => (non_empty(author.trim()), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_info_from_cargo() {
        let doc = openapi();
        assert_eq!(doc.info.title, env!("CARGO_PKG_NAME"));
        assert_eq!(doc.info.version, env!("CARGO_PKG_VERSION"));
        assert_eq!(
            doc.info.description.as_deref(),
            Some(env!("CARGO_PKG_DESCRIPTION"))
        );

        let contact = doc.info.contact;
        assert!(contact.is_some());
        if let Some(contact) = contact {
            assert_eq!(contact.name.as_deref(), Some("Team Rentgate"));
            assert_eq!(contact.email.as_deref(), Some("team@rentgate.dev"));
        }

        let license = doc.info.license;
        assert!(license.is_some());
        if let Some(license) = license {
            assert_eq!(license.name, "BSD-3-Clause");
            assert_eq!(license.identifier.as_deref(), Some("BSD-3-Clause"));
        }
    }

    #[test]
    fn openapi_documents_auth_routes() {
        let doc = openapi();
        let tags = doc.tags.clone().unwrap_or_default();
        for name in ["rentgate", "auth", "health"] {
            assert!(tags.iter().any(|tag| tag.name == name), "missing tag {name}");
        }
        for path in [
            "/health",
            "/v1/auth/login",
            "/v1/auth/refresh",
            "/v1/auth/logout",
            "/v1/auth/logout-all",
            "/v1/auth/session",
            "/v1/auth/sessions",
            "/v1/auth/accounts/{account_id}/unlock",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing path {path}");
        }
    }

    #[test]
    fn parse_author_splits_name_and_email() {
        assert_eq!(
            parse_author("Team Rentgate <team@rentgate.dev>"),
            (Some("Team Rentgate"), Some("team@rentgate.dev"))
        );
        assert_eq!(parse_author("Solo"), (Some("Solo"), None));
        assert_eq!(parse_author("<ops@x.com>"), (None, Some("ops@x.com")));
    }
}
