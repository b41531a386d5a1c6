//! Judging-table allocation under contention
//!
//! The allocation statement is answered by `TableAllocationSim`, which runs
//! each allocation under one lock the way the row lock serializes the real
//! statement. These tests check the mapper's side of the contract: one
//! winner per table, a clean NOT_FOUND for the loser, no table handed out
//! twice within a hackathon, and a retry when the statement read a table
//! that was taken while it ran.

use std::collections::HashSet;
use std::sync::Arc;

use hackhub_api::mappers::project::ALLOCATION_ATTEMPTS;
use hackhub_api::mappers::ProjectMapper;
use hackhub_api::{ActiveHackathonMapper, Rbac};
use hackhub_core::{ErrorKind, Project};
use hackhub_test_utils::assertions::{assert_kind, assert_no_leak, assert_not_found};
use hackhub_test_utils::{fixtures, scripted_uow, ScriptedPool, TableAllocationSim};
use proptest::prelude::*;

fn allocator(pool: &ScriptedPool) -> Arc<ProjectMapper> {
    let rbac = Rbac::new();
    let uow = scripted_uow(pool);
    let hackathons = Arc::new(ActiveHackathonMapper::new(&rbac, uow.clone()));
    Arc::new(ProjectMapper::new(&rbac, uow, hackathons))
}

fn pool_with(sim: &Arc<TableAllocationSim>, size: usize) -> ScriptedPool {
    let pool = ScriptedPool::new(size);
    pool.set_responder(sim.responder());
    pool
}

#[tokio::test]
async fn test_last_table_goes_to_exactly_one_project() {
    let sim = TableAllocationSim::new();
    sim.add_table(1, 1, &[1, 2]);
    let pool = pool_with(&sim, 4);
    let mapper = allocator(&pool);

    let first = {
        let mapper = Arc::clone(&mapper);
        tokio::spawn(async move { mapper.assign_table(&fixtures::project(10, &[1, 2])).await })
    };
    let second = {
        let mapper = Arc::clone(&mapper);
        tokio::spawn(async move { mapper.assign_table(&fixtures::project(11, &[1, 2])).await })
    };
    let results = [first.await.unwrap(), second.await.unwrap()];

    let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);
    assert_eq!(winners[0].table_number, 1);
    let loser = results.iter().find(|r| r.is_err()).unwrap();
    assert_not_found(loser);

    assert_eq!(sim.assignments().len(), 1);
    assert_no_leak(&pool);
}

#[tokio::test]
async fn test_table_must_support_every_category() {
    let sim = TableAllocationSim::new();
    sim.add_table(1, 1, &[1]);
    sim.add_table(2, 2, &[2, 3]);
    let pool = pool_with(&sim, 2);
    let mapper = allocator(&pool);

    let result = mapper.assign_table(&fixtures::project(10, &[1, 2])).await;
    assert_not_found(&result);
    assert!(sim.assignments().is_empty());

    let assignment = mapper
        .assign_table(&fixtures::project(11, &[2, 3]))
        .await
        .unwrap();
    assert_eq!(assignment.table_number, 2);
    assert_eq!(assignment.project_id, 11);
}

#[tokio::test]
async fn test_tables_are_handed_out_by_priority() {
    let sim = TableAllocationSim::new();
    sim.add_table(5, 2, &[1]);
    sim.add_table(3, 1, &[1]);
    let pool = pool_with(&sim, 2);
    let mapper = allocator(&pool);

    let first = mapper.assign_table(&fixtures::project(1, &[1])).await.unwrap();
    let second = mapper.assign_table(&fixtures::project(2, &[1])).await.unwrap();
    assert_eq!(first.table_number, 3);
    assert_eq!(second.table_number, 5);
    assert_not_found(&mapper.assign_table(&fixtures::project(3, &[1])).await);
}

#[tokio::test]
async fn test_tables_are_per_hackathon() {
    let sim = TableAllocationSim::new();
    sim.add_table(1, 1, &[1]);
    let pool = pool_with(&sim, 2);
    let mapper = allocator(&pool);

    mapper.assign_table(&fixtures::project(1, &[1])).await.unwrap();

    let mut elsewhere = fixtures::project(2, &[1]);
    elsewhere.hackathon = Some("a-different-hackathon".to_string());
    let assignment = mapper.assign_table(&elsewhere).await.unwrap();
    assert_eq!(assignment.table_number, 1);
    assert_eq!(sim.assignments().len(), 2);
}

#[tokio::test]
async fn test_duplicate_categories_count_once() {
    let sim = TableAllocationSim::new();
    sim.add_table(7, 1, &[4, 9]);
    let pool = pool_with(&sim, 1);
    let mapper = allocator(&pool);

    let assignment = mapper
        .assign_table(&fixtures::project(1, &[9, 4, 9]))
        .await
        .unwrap();
    assert_eq!(assignment.table_number, 7);
}

#[tokio::test]
async fn test_unique_violation_reruns_the_allocation() {
    let pool = ScriptedPool::new(1);
    pool.push_error(fixtures::duplicate_error());
    pool.push_rows(vec![serde_json::json!({"table_number": 2, "project_id": 1})]);
    let mapper = allocator(&pool);

    let assignment = mapper
        .assign_table(&fixtures::project(1, &[1]))
        .await
        .unwrap();
    assert_eq!(assignment.table_number, 2);
    assert_eq!(pool.statements().len(), 2);
    assert_no_leak(&pool);
}

#[tokio::test]
async fn test_stale_read_still_gets_the_free_table() {
    let sim = TableAllocationSim::new();
    sim.add_table(1, 1, &[1, 2]);
    sim.add_table(2, 2, &[1, 2]);
    let pool = pool_with(&sim, 2);
    let mapper = allocator(&pool);

    let first = mapper.assign_table(&fixtures::project(1, &[1, 2])).await.unwrap();
    assert_eq!(first.table_number, 1);

    // The next statement read before table 1 was committed and picks it again.
    sim.stale_reads(1);
    let second = mapper.assign_table(&fixtures::project(2, &[1, 2])).await.unwrap();
    assert_eq!(second.table_number, 2);

    let tables: HashSet<i32> = sim
        .assignments()
        .iter()
        .map(|(_, a)| a.table_number)
        .collect();
    assert_eq!(tables, HashSet::from([1, 2]));
    assert_no_leak(&pool);
}

#[tokio::test]
async fn test_endless_races_end_in_not_found() {
    let sim = TableAllocationSim::new();
    sim.add_table(1, 1, &[1]);
    sim.add_table(2, 2, &[1]);
    let pool = pool_with(&sim, 1);
    let mapper = allocator(&pool);

    mapper.assign_table(&fixtures::project(1, &[1])).await.unwrap();
    sim.stale_reads(ALLOCATION_ATTEMPTS);
    assert_not_found(&mapper.assign_table(&fixtures::project(2, &[1])).await);
    assert_eq!(sim.assignments().len(), 1);

    // Once the reads catch up the free table is handed out.
    let assignment = mapper.assign_table(&fixtures::project(2, &[1])).await.unwrap();
    assert_eq!(assignment.table_number, 2);
}

#[tokio::test]
async fn test_other_failures_pass_through() {
    let pool = ScriptedPool::new(1);
    pool.push_error(hackhub_core::DataError::unavailable("connection reset"));
    let mapper = allocator(&pool);

    let result = mapper.assign_table(&fixtures::project(1, &[1])).await;
    assert_kind(&result, ErrorKind::Unavailable);
}

#[tokio::test]
async fn test_project_without_hackathon_uses_active_one() {
    let sim = TableAllocationSim::new();
    sim.add_table(1, 1, &[1]);
    let pool = pool_with(&sim, 1);
    pool.push_rows(vec![fixtures::hackathon_row()]);
    let mapper = allocator(&pool);

    let project = Project {
        hackathon: None,
        ..fixtures::project(1, &[1])
    };
    mapper.assign_table(&project).await.unwrap();
    let assignments = sim.assignments();
    assert_eq!(assignments[0].0, fixtures::ACTIVE_HACKATHON);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// However many projects race for however many eligible tables, every
    /// table is assigned at most once and every loser sees NOT_FOUND.
    #[test]
    fn prop_no_double_assignment(tables in 1usize..5, requests in 1usize..10) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .enable_all()
            .build()
            .unwrap();

        let sim = TableAllocationSim::new();
        for number in 0..tables {
            sim.add_table(number as i32 + 1, number as i32, &[1, 2]);
        }
        let pool = pool_with(&sim, 3);
        let mapper = allocator(&pool);

        let results = runtime.block_on(async {
            let mut tasks = Vec::new();
            for project in 0..requests {
                let mapper = Arc::clone(&mapper);
                tasks.push(tokio::spawn(async move {
                    mapper
                        .assign_table(&fixtures::project(project as i64 + 100, &[1, 2]))
                        .await
                }));
            }
            let mut results = Vec::new();
            for task in tasks {
                results.push(task.await.unwrap());
            }
            results
        });

        let won: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        prop_assert_eq!(won.len(), tables.min(requests));
        for result in &results {
            if let Err(e) = result {
                prop_assert_eq!(e.kind, ErrorKind::NotFound);
            }
        }
        let distinct: HashSet<i32> = won.iter().map(|a| a.table_number).collect();
        prop_assert_eq!(distinct.len(), won.len());
        prop_assert_eq!(sim.assignments().len(), won.len());
        prop_assert_eq!(pool.available(), pool.max_size());
    }
}
