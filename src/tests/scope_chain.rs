use super::*;

#[test]
fn form_owner_is_consulted_before_the_element() -> Result<()> {
    let mut session = session(
        r#"<form id="f" name="outer"><input id="i" name="inner" onclick="document.title = name; return true"></form>"#,
    )?;
    let input = element(&session, "i")?;
    session.click(input)?;
    assert_eq!(session.title(), "outer");
    Ok(())
}

#[test]
fn named_form_controls_resolve_as_bare_identifiers() -> Result<()> {
    let mut session = session(
        r#"<form id="f"><input id="qty" name="qty" value="3"><button id="go" onclick="document.title = qty.value; return true">go</button></form>"#,
    )?;
    let button = element(&session, "go")?;
    session.click(button)?;
    assert_eq!(session.title(), "3");
    Ok(())
}

#[test]
fn element_members_shadow_document_members() -> Result<()> {
    let mut session = session(
        r#"<p id="p" title="para" onclick="document.title = 'x' + title; return true"></p>"#,
    )?;
    let paragraph = element(&session, "p")?;
    session.click(paragraph)?;
    assert_eq!(session.title(), "xpara");
    Ok(())
}

#[test]
fn document_members_resolve_without_qualification() -> Result<()> {
    let mut session = session(
        r#"<p id="p" onclick="document.title = String(getElementById('p') === this); return true"></p>"#,
    )?;
    let paragraph = element(&session, "p")?;
    session.click(paragraph)?;
    assert_eq!(session.title(), "true");
    Ok(())
}

#[test]
fn chain_bindings_shadow_realm_globals() -> Result<()> {
    let mut session = outside_only(
        r#"<p id="para" onclick="document.title = id + '/' + answer; return true"></p>"#,
    )?;
    session.eval("var id = 'global'; var answer = 42;")?;
    let paragraph = element(&session, "para")?;
    session.click(paragraph)?;
    assert_eq!(session.title(), "para/42");
    Ok(())
}

#[test]
fn window_handlers_only_see_the_document() -> Result<()> {
    let session = session(
        r#"<body id="main" onload="document.title = typeof tagName + ':' + typeof getElementById; return true"></body>"#,
    )?;
    assert_eq!(session.title(), "undefined:function");
    Ok(())
}

#[test]
fn assignments_to_chain_members_write_through() -> Result<()> {
    let mut session = session(
        r#"<p id="p" onclick="className = 'touched'; return true"></p>"#,
    )?;
    let paragraph = element(&session, "p")?;
    session.click(paragraph)?;
    assert_eq!(session.get_attribute(paragraph, "class").as_deref(), Some("touched"));
    Ok(())
}

#[test]
fn handler_locals_do_not_leak_into_the_realm() -> Result<()> {
    let mut session = outside_only(
        r#"<p id="p" onclick="var local = 1; leaked = 2; return true"></p>"#,
    )?;
    let paragraph = element(&session, "p")?;
    session.click(paragraph)?;
    assert_eq!(session.eval("typeof local")?, Value::String("undefined".into()));
    assert_eq!(session.eval("leaked")?, Value::Number(2.0));
    Ok(())
}

#[test]
fn moving_an_element_into_a_form_changes_its_chain_on_next_compile() -> Result<()> {
    let mut session = session(
        r#"<form id="f" name="owner"></form><input id="i" name="free" onclick="document.title = name; return true">"#,
    )?;
    let input = element(&session, "i")?;
    let form = element(&session, "f")?;
    session.click(input)?;
    assert_eq!(session.title(), "free");

    session.append_child(form, input)?;
    session.set_attribute(input, "onclick", "document.title = name; return true")?;
    session.click(input)?;
    assert_eq!(session.title(), "owner");
    Ok(())
}
