use anyhow::Result;
use serde_json::json;

use super::BlockEvent;
use super::BlockPhase;
use super::InboundEvent;
use crate::domain::models::ChatError;

#[test]
fn it_decodes_block_start() -> Result<()> {
    let event = InboundEvent::decode(
        r#"{"kind":"block","type":"tool_call","phase":"start","messageId":"m1","blockId":"b1","payload":{"toolName":"notes_search"}}"#,
    )?;

    assert_eq!(
        event,
        InboundEvent::Block(BlockEvent {
            event_type: "tool_call".to_string(),
            phase: BlockPhase::Start {
                message_id: "m1".to_string(),
                block_id: Some("b1".to_string()),
                payload: json!({"toolName": "notes_search"}),
            },
        })
    );

    return Ok(());
}

#[test]
fn it_decodes_block_start_without_optionals() -> Result<()> {
    let event =
        InboundEvent::decode(r#"{"kind":"block","type":"text","phase":"start","messageId":"m1"}"#)?;

    match event {
        InboundEvent::Block(BlockEvent {
            phase:
                BlockPhase::Start {
                    block_id, payload, ..
                },
            ..
        }) => {
            assert!(block_id.is_none());
            assert!(payload.is_null());
        }
        _ => panic!("Wrong enum"),
    }

    return Ok(());
}

#[test]
fn it_decodes_chunks_and_ends() -> Result<()> {
    let chunk =
        InboundEvent::decode(r#"{"kind":"block","type":"text","phase":"chunk","blockId":"b1","chunk":"Hi"}"#)?;
    let end = InboundEvent::decode(
        r#"{"kind":"block","type":"text","phase":"end","blockId":"b1","result":{"ok":true}}"#,
    )?;

    assert_eq!(
        chunk,
        InboundEvent::Block(BlockEvent {
            event_type: "text".to_string(),
            phase: BlockPhase::Chunk {
                block_id: "b1".to_string(),
                chunk: "Hi".to_string(),
            },
        })
    );
    assert_eq!(
        end,
        InboundEvent::Block(BlockEvent {
            event_type: "text".to_string(),
            phase: BlockPhase::End {
                block_id: "b1".to_string(),
                result: Some(json!({"ok": true})),
            },
        })
    );

    return Ok(());
}

#[test]
fn it_decodes_stream_lifecycle() -> Result<()> {
    let event =
        InboundEvent::decode(r#"{"kind":"stream_error","messageId":"m1","error":"model offline"}"#)?;
    assert_eq!(
        event,
        InboundEvent::StreamError {
            message_id: "m1".to_string(),
            error: "model offline".to_string(),
        }
    );

    return Ok(());
}

#[test]
fn it_fails_on_malformed_lines() {
    let res = InboundEvent::decode("this is not json");
    assert!(matches!(res, Err(ChatError::MalformedEvent { .. })));

    let res = InboundEvent::decode(r#"{"kind":"block","type":"text","phase":"chunk"}"#);
    assert!(matches!(res, Err(ChatError::MalformedEvent { .. })));

    let res = InboundEvent::decode(r#"{"kind":"unknown"}"#);
    assert!(res.is_err());
}
