use crate::*;
use rocket::get;

/// Single sign-out entry point for services: end the local session.
#[get("/cas/logout")]
pub fn provider_logout() -> SeeOther {
    SeeOther(String::from("/logout"))
}
