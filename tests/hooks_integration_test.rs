//! Hook behavior inside the run loop: rewrites, blocks, lifecycle
//! bracketing, and failure isolation.

mod common;

use claude_agent::{
    Agent, AgentOptions, ContentBlock, Error, HookEvent, HookOutput, Hooks, Session, ToolOutput,
    tool,
};
use common::{ScriptedStreamer, text_response, tool_use_response};
use std::sync::{Arc, Mutex};

fn recording_hooks(log: Arc<Mutex<Vec<HookEvent>>>, events: &[HookEvent]) -> Hooks {
    let mut hooks = Hooks::new();
    for &event in events {
        let log = Arc::clone(&log);
        hooks = hooks.on(event, move |input| {
            let log = Arc::clone(&log);
            async move {
                log.lock().unwrap().push(input.event.unwrap());
                Ok(None)
            }
        });
    }
    hooks
}

#[tokio::test]
async fn lifecycle_hooks_bracket_the_run() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let hooks = recording_hooks(
        Arc::clone(&log),
        &[
            HookEvent::SessionStart,
            HookEvent::UserPromptSubmit,
            HookEvent::PreApiRequest,
            HookEvent::PostApiRequest,
            HookEvent::Stop,
            HookEvent::SessionEnd,
        ],
    );

    let streamer = ScriptedStreamer::new(vec![text_response(&["hi"], "end_turn", 5, 2)]);
    let agent = Agent::new(
        AgentOptions::builder()
            .model("claude-opus-4-6")
            .streamer(streamer)
            .hooks(hooks)
            .build()
            .unwrap(),
    )
    .unwrap();

    let _ = agent
        .run(Session::new("claude-opus-4-6"), "hello")
        .into_session()
        .await
        .unwrap();

    let seen = log.lock().unwrap().clone();
    assert_eq!(
        seen,
        vec![
            HookEvent::SessionStart,
            HookEvent::UserPromptSubmit,
            HookEvent::PreApiRequest,
            HookEvent::PostApiRequest,
            HookEvent::Stop,
            HookEvent::SessionEnd,
        ]
    );
}

#[tokio::test]
async fn pre_tool_use_rewrites_input() {
    let received = Arc::new(Mutex::new(None));
    let streamer = ScriptedStreamer::new(vec![
        tool_use_response("t1", "get_weather", r#"{"city":"SF"}"#),
        text_response(&["ok"], "end_turn", 5, 2),
    ]);

    let weather = tool("get_weather", "Get weather").build({
        let received = Arc::clone(&received);
        move |input, _context| {
            let received = Arc::clone(&received);
            async move {
                *received.lock().unwrap() = Some(input);
                Ok(ToolOutput::text("72F"))
            }
        }
    });

    // Two matchers: the later rewrite wins.
    let hooks = Hooks::new()
        .on(HookEvent::PreToolUse, |_input| async move {
            Ok(Some(HookOutput::updated_input(
                serde_json::json!({"city": "Oakland"}),
            )))
        })
        .on(HookEvent::PreToolUse, |_input| async move {
            Ok(Some(HookOutput::updated_input(
                serde_json::json!({"city": "Berkeley"}),
            )))
        });

    let agent = Agent::new(
        AgentOptions::builder()
            .model("claude-opus-4-6")
            .streamer(streamer)
            .tool(weather)
            .permissions(claude_agent::Permissions::new().allow("*"))
            .hooks(hooks)
            .build()
            .unwrap(),
    )
    .unwrap();

    let _ = agent
        .run(Session::new("claude-opus-4-6"), "weather")
        .into_session()
        .await
        .unwrap();

    assert_eq!(
        received.lock().unwrap().clone().unwrap(),
        serde_json::json!({"city": "Berkeley"})
    );
}

#[tokio::test]
async fn pre_tool_use_block_synthesizes_error_result() {
    let streamer = ScriptedStreamer::new(vec![
        tool_use_response("t1", "get_weather", r#"{"city":"SF"}"#),
        text_response(&["ok"], "end_turn", 5, 2),
    ]);
    let weather = tool("get_weather", "Get weather")
        .build(|_input, _context| async move { panic!("must not execute") });

    let hooks = Hooks::new().on(HookEvent::PreToolUse, |_input| async move {
        Ok(Some(HookOutput::block("quota exceeded")))
    });

    let agent = Agent::new(
        AgentOptions::builder()
            .model("claude-opus-4-6")
            .streamer(streamer)
            .tool(weather)
            .hooks(hooks)
            .build()
            .unwrap(),
    )
    .unwrap();

    let session = agent
        .run(Session::new("claude-opus-4-6"), "weather")
        .into_session()
        .await
        .unwrap();

    match &session.messages[2].content[0] {
        ContentBlock::ToolResult(result) => {
            assert!(result.is_error);
            assert_eq!(result.content, "tool blocked: quota exceeded");
        }
        other => panic!("expected tool result, got {other:?}"),
    }
    // The run survived and reached end_turn.
    assert_eq!(session.messages[3].text(), "ok");
}

#[tokio::test]
async fn pre_tool_use_error_synthesizes_result_and_continues() {
    let streamer = ScriptedStreamer::new(vec![
        tool_use_response("t1", "get_weather", r#"{"city":"SF"}"#),
        text_response(&["ok"], "end_turn", 5, 2),
    ]);
    let weather = tool("get_weather", "Get weather")
        .build(|_input, _context| async move { panic!("must not execute") });

    let hooks = Hooks::new().on(HookEvent::PreToolUse, |_input| async move {
        Err(Error::hook("hook backend unreachable"))
    });

    let agent = Agent::new(
        AgentOptions::builder()
            .model("claude-opus-4-6")
            .streamer(streamer)
            .tool(weather)
            .hooks(hooks)
            .build()
            .unwrap(),
    )
    .unwrap();

    let session = agent
        .run(Session::new("claude-opus-4-6"), "weather")
        .into_session()
        .await
        .unwrap();

    match &session.messages[2].content[0] {
        ContentBlock::ToolResult(result) => {
            assert!(result.is_error);
            assert!(result.content.contains("hook error"));
        }
        other => panic!("expected tool result, got {other:?}"),
    }
}

#[tokio::test]
async fn post_hooks_observe_success_and_failure() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let streamer = ScriptedStreamer::new(vec![
        tool_use_response("t1", "flaky", r#"{"fail":false}"#),
        tool_use_response("t2", "flaky", r#"{"fail":true}"#),
        text_response(&["done"], "end_turn", 5, 2),
    ]);

    let flaky = tool("flaky", "Sometimes fails").build(|input, _context| async move {
        if input["fail"].as_bool().unwrap_or(false) {
            Ok(ToolOutput::error("it failed"))
        } else {
            Ok(ToolOutput::text("it worked"))
        }
    });

    let hooks = {
        let mut hooks = Hooks::new();
        for event in [
            HookEvent::PostToolUse,
            HookEvent::PostToolUseFailure,
            HookEvent::ToolResult,
        ] {
            let log = Arc::clone(&log);
            hooks = hooks.on(event, move |input| {
                let log = Arc::clone(&log);
                async move {
                    log.lock().unwrap().push((input.event.unwrap(), input.tool_error.is_some()));
                    Ok(None)
                }
            });
        }
        hooks
    };

    let agent = Agent::new(
        AgentOptions::builder()
            .model("claude-opus-4-6")
            .streamer(streamer)
            .tool(flaky)
            .permissions(claude_agent::Permissions::new().allow("*"))
            .hooks(hooks)
            .build()
            .unwrap(),
    )
    .unwrap();

    let _ = agent
        .run(Session::new("claude-opus-4-6"), "run it twice")
        .into_session()
        .await
        .unwrap();

    let seen = log.lock().unwrap().clone();
    assert_eq!(
        seen,
        vec![
            // First turn: success path, then the unconditional ToolResult.
            (HookEvent::PostToolUse, false),
            (HookEvent::ToolResult, false),
            // Second turn: failure path.
            (HookEvent::PostToolUseFailure, true),
            (HookEvent::ToolResult, true),
        ]
    );
}

#[tokio::test]
async fn user_prompt_submit_block_ends_the_run() {
    let streamer = ScriptedStreamer::new(vec![text_response(&["never"], "end_turn", 1, 1)]);
    let hooks = Hooks::new().on(HookEvent::UserPromptSubmit, |_input| async move {
        Ok(Some(HookOutput::block("prompt rejected by policy")))
    });

    let agent = Agent::new(
        AgentOptions::builder()
            .model("claude-opus-4-6")
            .streamer(Arc::clone(&streamer) as Arc<dyn claude_agent::Streamer>)
            .hooks(hooks)
            .build()
            .unwrap(),
    )
    .unwrap();

    let collected = agent
        .run(Session::new("claude-opus-4-6"), "forbidden")
        .into_events()
        .collect_all()
        .await;

    let result = collected.last().unwrap().as_result().unwrap();
    assert_eq!(result.subtype, claude_agent::events::RESULT_ERROR_DURING_EXECUTION);
    assert!(result.errors[0].contains("prompt blocked"));
    assert!(streamer.requests().is_empty());
}
