//! Talking to the upstream CAS server.

use crate::error::CasClientError;
use isahc::AsyncReadResponseExt;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// Checks a ticket handed back by the upstream CAS server.
#[rocket::async_trait]
pub trait TicketVerifier: Send + Sync {
    /// Returns the CAS username the ticket was issued to.
    async fn verify(&self, ticket: &str, service: &str) -> Result<String, CasClientError>;
}

/// Verifier calling the upstream `serviceValidate` endpoint over HTTP.
pub struct IsahcVerifier {
    validate_url: String,
}

impl IsahcVerifier {
    pub fn new(validate_url: impl Into<String>) -> Self {
        IsahcVerifier {
            validate_url: validate_url.into(),
        }
    }
}

#[rocket::async_trait]
impl TicketVerifier for IsahcVerifier {
    async fn verify(&self, ticket: &str, service: &str) -> Result<String, CasClientError> {
        let url = format!(
            "{}?service={}&ticket={}",
            self.validate_url,
            urlencoding::encode(service),
            urlencoding::encode(ticket)
        );
        let mut resp = isahc::get_async(url).await.map_err(CasClientError::Unreachable)?;
        if resp.status() != 200 {
            return Err(CasClientError::Unavailable(resp.status().as_u16()));
        }
        let xml = resp.text().await.map_err(|_| CasClientError::BadResponse)?;
        parse_service_response(&xml)
    }
}

/// Extracts the user from a CAS 2.0 `serviceResponse` document. Elements
/// are matched by local name, whatever namespace prefix the server uses.
pub fn parse_service_response(xml: &str) -> Result<String, CasClientError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut in_success = false;
    let mut reading_user = false;
    let mut user = String::new();
    let mut failure: Option<(String, String)> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"authenticationSuccess" => in_success = true,
                b"user" if in_success && user.is_empty() => reading_user = true,
                b"authenticationFailure" => failure = Some((failure_code(e), String::new())),
                _ => {}
            },
            Ok(Event::Empty(ref e)) if e.local_name().as_ref() == b"authenticationFailure" => {
                return Err(CasClientError::AuthenticationFailed {
                    code: failure_code(e),
                    message: String::new(),
                });
            }
            Ok(Event::Text(ref e)) => {
                let text = e.unescape().map_err(|_| CasClientError::BadResponse)?;
                collect(&text, reading_user, &mut user, &mut failure);
            }
            Ok(Event::CData(ref e)) => {
                collect(&String::from_utf8_lossy(e), reading_user, &mut user, &mut failure);
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"user" => reading_user = false,
                b"authenticationFailure" => {
                    if let Some((code, message)) = failure.take() {
                        return Err(CasClientError::AuthenticationFailed {
                            code,
                            message: message.trim().to_owned(),
                        });
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                tracing::debug!(error = %e, "unparsable CAS response");
                return Err(CasClientError::BadResponse);
            }
            _ => {}
        }
        buf.clear();
    }

    let user = user.trim();
    if !in_success || user.is_empty() {
        return Err(CasClientError::BadResponse);
    }
    Ok(user.to_owned())
}

fn collect(text: &str, reading_user: bool, user: &mut String, failure: &mut Option<(String, String)>) {
    if reading_user {
        user.push_str(text);
    } else if let Some((_, message)) = failure.as_mut() {
        message.push_str(text);
    }
}

fn failure_code(element: &BytesStart<'_>) -> String {
    element
        .attributes()
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == b"code")
        .and_then(|attr| attr.unescape_value().ok().map(|code| code.trim().to_owned()))
        .filter(|code| !code.is_empty())
        .unwrap_or_else(|| String::from("UNKNOWN"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{render_failure, render_success};

    #[test]
    fn reads_user_from_success() {
        let xml = r#"
            <cas:serviceResponse xmlns:cas='http://www.yale.edu/tp/cas'>
                <cas:authenticationSuccess>
                    <cas:user>jdoe</cas:user>
                    <cas:attributes><cas:mail>jdoe@example.edu</cas:mail></cas:attributes>
                </cas:authenticationSuccess>
            </cas:serviceResponse>
        "#;
        assert_eq!(parse_service_response(xml).unwrap(), "jdoe");
    }

    #[test]
    fn reads_escaped_user_from_our_own_server() {
        assert_eq!(parse_service_response(&render_success("o'neil&co")).unwrap(), "o'neil&co");
    }

    #[test]
    fn failure_carries_code_and_message() {
        let err = parse_service_response(&render_failure("INVALID_TICKET", "Ticket ST-1 not recognized")).unwrap_err();
        match err {
            CasClientError::AuthenticationFailed { code, message } => {
                assert_eq!(code, "INVALID_TICKET");
                assert_eq!(message, "Ticket ST-1 not recognized");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn default_namespace_success() {
        let xml = r#"<serviceResponse xmlns="http://www.yale.edu/tp/cas">
            <authenticationSuccess><user>jdoe</user></authenticationSuccess>
        </serviceResponse>"#;
        assert_eq!(parse_service_response(xml).unwrap(), "jdoe");
    }

    #[test]
    fn any_namespace_prefix_is_accepted() {
        let xml = r#"<sso:serviceResponse xmlns:sso="http://www.yale.edu/tp/cas">
            <sso:authenticationSuccess><sso:user><![CDATA[asmith]]></sso:user></sso:authenticationSuccess>
        </sso:serviceResponse>"#;
        assert_eq!(parse_service_response(xml).unwrap(), "asmith");
    }

    #[test]
    fn single_quoted_failure_code() {
        let xml = r#"<cas:serviceResponse xmlns:cas='http://www.yale.edu/tp/cas'>
            <cas:authenticationFailure code='INVALID_TICKET'>
                Ticket ST-1 not recognized
            </cas:authenticationFailure>
        </cas:serviceResponse>"#;
        match parse_service_response(xml).unwrap_err() {
            CasClientError::AuthenticationFailed { code, message } => {
                assert_eq!(code, "INVALID_TICKET");
                assert_eq!(message, "Ticket ST-1 not recognized");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn failure_without_code_is_unknown() {
        let xml = r#"<serviceResponse><authenticationFailure/></serviceResponse>"#;
        assert!(matches!(
            parse_service_response(xml),
            Err(CasClientError::AuthenticationFailed { code, .. }) if code == "UNKNOWN"
        ));
    }

    #[test]
    fn garbage_is_a_bad_response() {
        assert!(matches!(parse_service_response("<html>oops</html>"), Err(CasClientError::BadResponse)));
        assert!(matches!(
            parse_service_response("<cas:authenticationSuccess><cas:user></cas:user>"),
            Err(CasClientError::BadResponse)
        ));
        assert!(matches!(
            parse_service_response("<serviceResponse><user>jdoe</user></serviceResponse>"),
            Err(CasClientError::BadResponse)
        ));
        assert!(matches!(
            parse_service_response("<a><authenticationSuccess></a>"),
            Err(CasClientError::BadResponse)
        ));
    }
}
