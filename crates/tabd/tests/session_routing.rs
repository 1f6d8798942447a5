mod support;

use serde_json::json;
use support::{FakeExtension, Harness};
use tabd_protocol::{CommandType, IpcMessage, IpcMessageType};

fn command(id: &str, session_id: &str, command_type: CommandType) -> IpcMessage {
    let payload = json!({
        "id": id,
        "sessionId": session_id,
        "type": command_type,
        "params": null,
    });
    IpcMessage::new(IpcMessageType::Command, Some(payload))
}

#[tokio::test]
async fn per_session_commands_are_forwarded_in_submission_order() {
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    let harness = Harness::start(19401).await;
    let session_id = harness.create_session("fifo").await;
    let mut extension = FakeExtension::connect(19401, &session_id).await;

    // Two client connections, each writing its request without waiting for a reply, so both
    // commands are in flight at the daemon before either is answered.
    let (read1, mut write1) = harness.connect().await.into_split();
    let mut lines1 = BufReader::new(read1).lines();
    let line1 = serde_json::to_string(&command("c1", &session_id, CommandType::Click)).unwrap();
    write1.write_all(line1.as_bytes()).await.unwrap();
    write1.write_all(b"\n").await.unwrap();

    // Give c1 a chance to become the session's in-flight command before c2 is submitted.
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    let (read2, mut write2) = harness.connect().await.into_split();
    let mut lines2 = BufReader::new(read2).lines();
    let line2 = serde_json::to_string(&command("c2", &session_id, CommandType::Click)).unwrap();
    write2.write_all(line2.as_bytes()).await.unwrap();
    write2.write_all(b"\n").await.unwrap();

    // The extension must see c1 before c2, strictly one in flight at a time per session.
    let first_cmd = extension.recv_command().await;
    assert_eq!(first_cmd.id, "c1");
    extension.reply(&first_cmd.id, true).await;

    let reply1 = lines1.next_line().await.unwrap().unwrap();
    let reply1: IpcMessage = serde_json::from_str(&reply1).unwrap();
    assert_eq!(reply1.payload.unwrap()["id"], "c1");

    let second_cmd = extension.recv_command().await;
    assert_eq!(second_cmd.id, "c2");
    extension.reply(&second_cmd.id, true).await;

    let reply2 = lines2.next_line().await.unwrap().unwrap();
    let reply2: IpcMessage = serde_json::from_str(&reply2).unwrap();
    assert_eq!(reply2.payload.unwrap()["id"], "c2");

    extension.close().await;
    harness.stop().await;
}

#[tokio::test]
async fn tab_new_is_translated_to_tab_with_new_action() {
    let harness = Harness::start(19402).await;
    let session_id = harness.create_session("tabbed").await;
    let mut extension = FakeExtension::connect(19402, &session_id).await;

    let send = harness.send(command("c1", &session_id, CommandType::TabNew));
    let recv = extension.echo_next_command();
    let (reply, ext_cmd) = tokio::join!(send, recv);

    assert_eq!(ext_cmd.command_type, "tab");
    assert_eq!(ext_cmd.params.as_ref().unwrap().get("action").unwrap(), "new");
    assert_eq!(reply.payload.unwrap()["success"], true);

    extension.close().await;
    harness.stop().await;
}

#[tokio::test]
async fn sessions_are_isolated_from_one_another() {
    let harness = Harness::start(19403).await;
    let session_a = harness.create_session("alpha").await;
    let session_b = harness.create_session("beta").await;
    let mut ext_a = FakeExtension::connect(19403, &session_a).await;
    let mut ext_b = FakeExtension::connect(19403, &session_b).await;

    let send_a = harness.send(command("a1", &session_a, CommandType::Click));
    let recv_a = ext_a.echo_next_command();
    let (_reply_a, cmd_a) = tokio::join!(send_a, recv_a);
    assert_eq!(cmd_a.id, "a1");

    let send_b = harness.send(command("b1", &session_b, CommandType::Click));
    let recv_b = ext_b.echo_next_command();
    let (_reply_b, cmd_b) = tokio::join!(send_b, recv_b);
    assert_eq!(cmd_b.id, "b1");

    ext_a.close().await;
    ext_b.close().await;
    harness.stop().await;
}

#[tokio::test]
async fn extension_disconnect_fails_the_in_flight_command() {
    let harness = Harness::start(19404).await;
    let session_id = harness.create_session("flaky").await;
    let extension = FakeExtension::connect(19404, &session_id).await;

    // Close the extension without answering; the in-flight command should resolve with a
    // structured failure rather than hang.
    let send = harness.send(command("c1", &session_id, CommandType::Click));
    let close = async {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        extension.close().await;
    };
    let (reply, _) = tokio::join!(send, close);

    let payload = reply.payload.unwrap();
    assert_eq!(payload["id"], "c1");
    assert_eq!(payload["success"], false);
    assert!(payload["error"].as_str().unwrap().contains("disconnected"));

    harness.stop().await;
}
