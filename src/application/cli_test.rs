use anyhow::Result;
use test_utils::template_fixture;

use super::build;
use super::chat_mode;
use super::parse_fields;
use super::render_template;
use super::RunMode;
use crate::domain::models::ContextRef;

#[test]
fn it_parses_chat_arguments() -> Result<()> {
    let matches = build().try_get_matches_from(vec![
        "studymate",
        "chat",
        "Quiz me on derivatives",
        "--ref",
        "note:note-1:h1",
        "-r",
        "card:card-9:h2",
    ])?;
    let (_, chat_matches) = matches.subcommand().unwrap();

    assert_eq!(
        chat_mode(chat_matches)?,
        RunMode::Chat {
            prompt: "Quiz me on derivatives".to_string(),
            context_refs: vec![
                ContextRef::new("note-1", "note", "h1"),
                ContextRef::new("card-9", "card", "h2"),
            ],
        }
    );
    return Ok(());
}

#[test]
fn it_rejects_malformed_refs() -> Result<()> {
    let matches =
        build().try_get_matches_from(vec!["studymate", "chat", "hi", "--ref", "note-only"])?;
    let (_, chat_matches) = matches.subcommand().unwrap();

    assert!(chat_mode(chat_matches).is_err());
    return Ok(());
}

#[test]
fn it_rejects_unknown_backends() {
    let res = build().try_get_matches_from(vec!["studymate", "chat", "hi", "-b", "carrier-pigeon"]);
    assert!(res.is_err());
}

#[test]
fn it_parses_template_fields() -> Result<()> {
    let fields = parse_fields(&[
        "topic=chain rule".to_string(),
        "style=a=b".to_string(),
    ])?;

    assert_eq!(fields.get("topic").unwrap(), "chain rule");
    assert_eq!(fields.get("style").unwrap(), "a=b");
    assert!(parse_fields(&["topic".to_string()]).is_err());
    assert!(parse_fields(&["=value".to_string()]).is_err());
    return Ok(());
}

#[tokio::test]
async fn it_renders_template_files() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("anki.toml");
    std::fs::write(&path, template_fixture())?;
    let path = path.to_string_lossy().to_string();

    let matches = build().try_get_matches_from(vec![
        "studymate",
        "template",
        path.as_str(),
        "-f",
        "topic=limits",
        "--field",
        "count=3",
    ])?;
    let (_, template_matches) = matches.subcommand().unwrap();
    let res = render_template(template_matches).await?;
    assert_eq!(res, "Create 3 Anki cards about limits. ");

    let matches =
        build().try_get_matches_from(vec!["studymate", "template", path.as_str(), "-f", "topic=limits"])?;
    let (_, template_matches) = matches.subcommand().unwrap();
    let err = render_template(template_matches).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "template 'anki-basic' is missing required fields: count"
    );
    return Ok(());
}
