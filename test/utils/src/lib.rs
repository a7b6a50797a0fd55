/// A recorded assistant turn as the native bridge streams it: one text block,
/// a tool call, a memory lookup, an event for a block type nobody registered
/// and a garbage line.
pub fn events_fixture() -> &'static str {
    return r#"{"kind":"stream_start","messageId":"m-assistant"}
{"kind":"block","type":"thinking","phase":"start","messageId":"m-assistant","blockId":"b-think"}
{"kind":"block","type":"thinking","phase":"chunk","blockId":"b-think","chunk":"Recall the chain rule. "}
{"kind":"block","type":"thinking","phase":"end","blockId":"b-think"}
{"kind":"block","type":"tool_call","phase":"start","messageId":"m-assistant","blockId":"b-tool","payload":{"toolName":"notes_search","args":{"query":"derivatives"}}}
{"kind":"block","type":"tool_call","phase":"end","blockId":"b-tool","result":{"hits":2}}
{"kind":"block","type":"memory_retrieval","phase":"start","messageId":"m-assistant","blockId":"b-mem"}
{"kind":"block","type":"memory_retrieval","phase":"end","blockId":"b-mem","result":{"memories":[{"id":"mem-1"}]}}
{"kind":"block","type":"quiz_card","phase":"start","messageId":"m-assistant","blockId":"b-quiz"}
this is not json
{"kind":"block","type":"text","phase":"start","messageId":"m-assistant","blockId":"b-text"}
{"kind":"block","type":"text","phase":"chunk","blockId":"b-text","chunk":"The derivative of sin(x^2) "}
{"kind":"block","type":"text","phase":"chunk","blockId":"b-text","chunk":"is 2x cos(x^2)."}
{"kind":"block","type":"text","phase":"end","blockId":"b-text"}
{"kind":"stream_complete","messageId":"m-assistant"}
"#;
}

pub fn template_fixture() -> &'static str {
    return r#"
[template]
name = "anki-basic"
required = ["topic", "count"]
body = "Create {{count}} Anki cards about {{topic}}. {{style}}"
"#;
}
