use super::*;
use crate::session::SessionHandle;
use crate::*;
use rocket::get;

/// Forget the local session, then end the upstream CAS session too.
#[get("/logout")]
pub fn client_logout(client: &State<CasClient>, session: SessionHandle<'_>) -> SeeOther {
    if !session.exists() {
        return SeeOther(String::from("/"));
    }
    if let Some(cas_user) = session.get().cas_user {
        tracing::info!(cas_user = %cas_user, "logging out");
    }
    session.destroy();
    SeeOther(client.config.logout_url())
}
