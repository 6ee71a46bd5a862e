mod utils;

use ranker::leaderboard::Standing;
use ranker::score::normalize;
use ranker::{
    LeaderboardId, PageParams, RankOutcome, RankingStore, RebuildMode, ScoringPolicy, WindowParams,
};
use utils::TestSetupBuilder;

#[tokio::test]
async fn full_replace_restores_ranks_after_store_loss() {
    let setup = TestSetupBuilder::new()
        .with_game("Pinball", ScoringPolicy::HigherIsBetter)
        .build();
    let game = setup.game(0).clone();
    let board = game.leaderboard();

    setup.submit("alice", &game, 100.0).await;
    setup.submit("alice", &game, 80.0).await;
    setup.submit("bob", &game, 150.0).await;
    setup.submit("carol", &game, 120.0).await;
    setup.submit("carol", &game, 200.0).await;

    let before = setup
        .service
        .leaderboard_page(&game.id, PageParams::default())
        .await
        .unwrap();

    // Simulate total loss of the fast ranking store
    setup.store.clear(&board).await.unwrap();
    setup.store.clear(&LeaderboardId::Global).await.unwrap();
    assert_eq!(setup.store.cardinality(&board).await.unwrap(), 0);

    setup
        .rebuild_controller()
        .rebuild(&board, RebuildMode::FullReplace)
        .await
        .unwrap();
    setup
        .rebuild_controller()
        .rebuild(&LeaderboardId::Global, RebuildMode::FullReplace)
        .await
        .unwrap();

    let after = setup
        .service
        .leaderboard_page(&game.id, PageParams::default())
        .await
        .unwrap();

    assert_eq!(before.total_entrants, after.total_entrants);
    for (b, a) in before.entries.iter().zip(after.entries.iter()) {
        assert_eq!(b.rank, a.rank);
        assert_eq!(b.entrant_id, a.entrant_id);
        assert_eq!(b.score, a.score);
    }

    // And the ranks match what the ledger's best-per-entrant records imply
    let ids: Vec<&str> = after.entries.iter().map(|e| e.entrant_id.as_str()).collect();
    assert_eq!(ids, vec!["carol", "bob", "alice"]);
    assert_eq!(after.entries[0].score, 200.0);

    let global = setup.service.global_page(PageParams::default()).await.unwrap();
    assert_eq!(global.entries[0].entrant_id, "carol");
    assert_eq!(global.entries[0].score, 2.0);
}

#[tokio::test]
async fn rebuilding_a_consistent_board_changes_nothing() {
    let setup = TestSetupBuilder::new()
        .with_game("Sprint", ScoringPolicy::LowerIsBetter)
        .build();
    let game = setup.game(0).clone();
    let board = game.leaderboard();

    setup.submit("bob", &game, 12.3).await;
    setup.submit("bob", &game, 9.8).await;
    setup.submit("eve", &game, 11.0).await;

    let before = setup
        .service
        .leaderboard_page(&game.id, PageParams::default())
        .await
        .unwrap();

    let report = setup
        .rebuild_controller()
        .rebuild(&board, RebuildMode::Merge)
        .await
        .unwrap();

    assert_eq!(report.scanned, 2);
    assert_eq!(report.unchanged, 2);
    assert_eq!(report.applied, 0);
    assert_eq!(report.drift_corrected, 0);

    let after = setup
        .service
        .leaderboard_page(&game.id, PageParams::default())
        .await
        .unwrap();
    for (b, a) in before.entries.iter().zip(after.entries.iter()) {
        assert_eq!(b.rank, a.rank);
        assert_eq!(b.entrant_id, a.entrant_id);
        assert_eq!(b.achieved_at, a.achieved_at);
    }
}

#[tokio::test]
async fn merge_rebuild_corrects_drift_without_dropping_live_entrants() {
    let setup = TestSetupBuilder::new()
        .with_game("Pinball", ScoringPolicy::HigherIsBetter)
        .build();
    let game = setup.game(0).clone();
    let board = game.leaderboard();

    setup.submit("alice", &game, 100.0).await;
    setup.submit("bob", &game, 90.0).await;

    // Corrupt alice's standing to simulate drift between store and ledger
    setup
        .store
        .upsert(
            &board,
            "alice",
            Standing {
                key: normalize(5.0, ScoringPolicy::HigherIsBetter).unwrap(),
                achieved_at: chrono::Utc::now(),
            },
        )
        .await
        .unwrap();

    let wrong = setup
        .service
        .my_rank(&game.id, "alice", WindowParams::default())
        .await
        .unwrap();
    match wrong {
        RankOutcome::Ranked(view) => assert_eq!(view.rank, 2),
        RankOutcome::Unranked { .. } => panic!("alice should be ranked"),
    }

    let report = setup
        .rebuild_controller()
        .rebuild(&board, RebuildMode::Merge)
        .await
        .unwrap();
    assert_eq!(report.drift_corrected, 1);

    let fixed = setup
        .service
        .my_rank(&game.id, "alice", WindowParams::default())
        .await
        .unwrap();
    match fixed {
        RankOutcome::Ranked(view) => {
            assert_eq!(view.rank, 1);
            assert_eq!(view.score, 100.0);
        }
        RankOutcome::Unranked { .. } => panic!("alice should be ranked"),
    }

    // Merge never removed bob
    assert_eq!(setup.store.cardinality(&board).await.unwrap(), 2);
}

#[tokio::test]
async fn live_submissions_keep_working_after_rebuilds() {
    let setup = TestSetupBuilder::new()
        .with_game("Pinball", ScoringPolicy::HigherIsBetter)
        .build();
    let game = setup.game(0).clone();
    let board = game.leaderboard();

    setup.submit("alice", &game, 100.0).await;
    setup
        .rebuild_controller()
        .rebuild(&board, RebuildMode::FullReplace)
        .await
        .unwrap();

    let outcome = setup.submit("bob", &game, 150.0).await;
    let (rank, _, _, total) = utils::ranked(outcome);
    assert_eq!(rank, 1);
    assert_eq!(total, 2);
}

#[tokio::test]
async fn rebuild_in_small_batches_covers_every_entrant() {
    let setup = TestSetupBuilder::new()
        .with_game("Pinball", ScoringPolicy::HigherIsBetter)
        .build();
    let game = setup.game(0).clone();
    let board = game.leaderboard();

    for i in 0..23 {
        setup
            .submit(&format!("entrant-{:02}", i), &game, (i * 3) as f64)
            .await;
    }

    setup.store.clear(&board).await.unwrap();

    let report = setup
        .rebuild_controller()
        .with_batch_size(5)
        .rebuild(&board, RebuildMode::Merge)
        .await
        .unwrap();

    assert_eq!(report.scanned, 23);
    assert_eq!(report.batches, 5);
    assert_eq!(setup.store.cardinality(&board).await.unwrap(), 23);
}

#[tokio::test]
async fn rebuild_preserves_tie_break_order() {
    let setup = TestSetupBuilder::new()
        .with_game("Pinball", ScoringPolicy::HigherIsBetter)
        .build();
    let game = setup.game(0).clone();
    let board = game.leaderboard();

    setup.submit("first", &game, 400.0).await;
    setup.submit("second", &game, 400.0).await;

    setup.store.clear(&board).await.unwrap();
    setup
        .rebuild_controller()
        .rebuild(&board, RebuildMode::FullReplace)
        .await
        .unwrap();

    let page = setup
        .service
        .leaderboard_page(&game.id, PageParams::default())
        .await
        .unwrap();
    let ids: Vec<&str> = page.entries.iter().map(|e| e.entrant_id.as_str()).collect();
    // The earlier achiever of the tied score still ranks higher
    assert_eq!(ids, vec!["first", "second"]);
}
