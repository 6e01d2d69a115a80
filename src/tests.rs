use super::*;

mod cancellation;
mod error_reporting;
mod handler_attributes;
mod scope_chain;
mod session_options;

/// A console that records without echoing to stderr.
fn quiet() -> VirtualConsole {
    VirtualConsole::new()
}

fn session(markup: &str) -> Result<Session> {
    Session::new(markup, SessionOptions::new().virtual_console(quiet()))
}

fn session_with(markup: &str, options: SessionOptions) -> Result<Session> {
    Session::new(markup, options.virtual_console(quiet()))
}

/// A session whose realm is reachable through `eval`, with script elements
/// still inert.
fn outside_only(markup: &str) -> Result<Session> {
    session_with(markup, SessionOptions::new().run_scripts("outside-only"))
}

fn element(session: &Session, id: &str) -> Result<NodeId> {
    session
        .get_element_by_id(id)
        .ok_or_else(|| Error::ScriptRuntime(format!("missing #{id}")))
}

#[test]
fn doctype_markup_builds_a_clickable_document() -> Result<()> {
    let mut session = session(
        r#"<!DOCTYPE html><button id="b" onclick="document.title = 'clicked'; return true">go</button>"#,
    )?;
    let button = element(&session, "b")?;
    assert!(session.click(button)?);
    assert_eq!(session.title(), "clicked");
    assert!(session.serialize().starts_with("<!DOCTYPE html>"));
    Ok(())
}
