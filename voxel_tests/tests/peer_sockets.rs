//! Full peer runtimes over a real rendezvous server and TCP data channels.

use voxel_client::{Peer, RendezvousClient};
use voxel_rendezvous::RendezvousServer;
use voxel_shared::{
    inventory::Slot,
    registry::{BlockId, ItemId},
    sim::Action,
    snapshot::Snapshot,
    topology::RoleState,
};
use voxel_tests::{init_tracing, registry, spawn_peer, step_until, test_config};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn join_place_and_migrate() -> anyhow::Result<()> {
    init_tracing();
    let rendezvous = RendezvousServer::spawn("127.0.0.1:0").await?;
    let addr = rendezvous.local_addr();

    let mut peers = vec![spawn_peer(addr, test_config("X")).await?];
    step_until(&mut peers, "first joiner hosts", |p| p[0].is_host()).await?;

    peers.push(spawn_peer(addr, test_config("X")).await?);
    let (p1, p2) = (peers[0].me(), peers[1].me());
    step_until(&mut peers, "client linked and synced", |p| {
        p[1].client_session()
            .is_some_and(|c| c.is_linked() && c.last_sync().is_some())
    })
    .await?;
    assert_eq!(peers[1].role(), RoleState::Client { host: p1 });

    // PLACE from the client, BLOCK back to everyone.
    let dirt = ItemId::from_block(BlockId::DIRT);
    if let Some(p) = peers[0].host_session_mut().and_then(|h| h.sim_mut().player_mut(p2)) {
        p.inventory.set(0, Slot::new(dirt, 1));
    }
    assert_eq!(peers[1].get_block(10, 10), BlockId::AIR);
    assert!(peers[1].submit(Action::Place { x: 10, y: 10, slot: 0 }));
    step_until(&mut peers, "both peers see the placed block", |p| {
        p[0].get_block(10, 10) == BlockId::DIRT && p[1].get_block(10, 10) == BlockId::DIRT
    })
    .await?;

    // The host leaves; the client takes over with the terrain it holds.
    drop(peers.remove(0));
    step_until(&mut peers, "client promoted", |p| p[0].is_host()).await?;
    assert_eq!(peers[0].get_block(10, 10), BlockId::DIRT);
    let host = peers[0].host_session().expect("promoted host");
    assert!(host.sim().player(p1).is_none());
    assert!(host.sim().player(p2).is_some());

    // A newcomer is served by the promoted host.
    peers.push(spawn_peer(addr, test_config("X")).await?);
    step_until(&mut peers, "newcomer linked to the new host", |p| {
        p[1].client_session()
            .is_some_and(|c| c.host() == p2 && c.is_linked() && c.last_sync().is_some())
    })
    .await?;
    assert_eq!(peers[1].get_block(10, 10), BlockId::DIRT);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn surviving_clients_repoint_to_new_host() -> anyhow::Result<()> {
    init_tracing();
    let rendezvous = RendezvousServer::spawn("127.0.0.1:0").await?;
    let addr = rendezvous.local_addr();

    let mut peers = vec![spawn_peer(addr, test_config("R")).await?];
    step_until(&mut peers, "host", |p| p[0].is_host()).await?;
    peers.push(spawn_peer(addr, test_config("R")).await?);
    step_until(&mut peers, "second member", |p| p[1].client_session().is_some()).await?;
    peers.push(spawn_peer(addr, test_config("R")).await?);
    step_until(&mut peers, "all linked", |p| {
        p[1..]
            .iter()
            .all(|peer| peer.client_session().is_some_and(|c| c.is_linked()))
    })
    .await?;
    let (p2, p3) = (peers[1].me(), peers[2].me());

    drop(peers.remove(0));
    step_until(&mut peers, "oldest member hosts, other re-links", |p| {
        p[0].is_host()
            && p[1]
                .client_session()
                .is_some_and(|c| c.host() == p2 && c.is_linked())
    })
    .await?;
    step_until(&mut peers, "re-linked member synced", |p| {
        p[0].host_session().is_some_and(|h| h.peer_ids() == vec![p3])
            && p[1].client_session().is_some_and(|c| {
                c.last_sync()
                    .is_some_and(|s| s.players.iter().all(|pl| pl.id == p2 || pl.id == p3))
            })
    })
    .await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn console_mining_and_snapshot_resume() -> anyhow::Result<()> {
    init_tracing();
    let rendezvous = RendezvousServer::spawn("127.0.0.1:0").await?;
    let mut peers = vec![spawn_peer(rendezvous.local_addr(), test_config("M")).await?];
    let me = peers[0].me();

    step_until(&mut peers, "host player on the ground", |p| {
        p[0].host_session()
            .and_then(|h| h.sim().player(me))
            .is_some_and(|pl| pl.body.grounded)
    })
    .await?;

    let (x, y) = {
        let body = &peers[0].host_session().and_then(|h| h.sim().player(me)).expect("player").body;
        let c = body.center();
        (c.x.floor() as i32, (body.pos.y + body.size.y + 0.01).floor() as i32)
    };
    assert!(!peers[0].get_block(x, y).is_air());

    assert_eq!(peers[0].exec_console(&format!("mine {x} {y}")), vec![format!("Mining ({x}, {y})")]);
    step_until(&mut peers, "block under the player mined", |p| {
        !p[0].is_mining() && p[0].get_block(x, y).is_air()
    })
    .await?;

    let path = std::env::temp_dir().join(format!("voxel-peer-{}-{}.json", std::process::id(), me.0));
    let out = peers[0].exec_console(&format!("save {}", path.display()));
    assert!(out[0].starts_with("Saved"), "{out:?}");

    let snapshot = Snapshot::load(&path)?;
    let _ = std::fs::remove_file(&path);
    let resumed = Peer::<RendezvousClient>::detached(test_config("M"), registry(), &snapshot);
    assert!(resumed.is_host());
    assert!(resumed.get_block(x, y).is_air());
    Ok(())
}
