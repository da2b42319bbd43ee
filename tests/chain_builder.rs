mod common;

use common::*;
use referral_backend::entities::{chain_link_entity as links, user_level_stat_entity as level_stats};
use referral_backend::error::{AppError, IneligibilityReason};
use referral_backend::services::load_chain;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};

#[tokio::test]
async fn test_chain_shifts_and_truncates_to_max_depth() {
    let h = Harness::new(schedule("5.00,3.00,2.00", None), 3).await;
    let line = h.referral_line(5).await;
    let ids: Vec<i64> = line.iter().map(|u| u.id).collect();

    assert!(load_chain(&h.db, ids[0]).await.unwrap().is_none());

    let second = load_chain(&h.db, ids[1]).await.unwrap().unwrap();
    assert_eq!(second.ancestors, vec![ids[0]]);

    let fourth = load_chain(&h.db, ids[3]).await.unwrap().unwrap();
    assert_eq!(fourth.ancestors, vec![ids[2], ids[1], ids[0]]);

    // 深度截断为 3，最老的祖先被移出
    let fifth = load_chain(&h.db, ids[4]).await.unwrap().unwrap();
    assert_eq!(fifth.ancestors, vec![ids[3], ids[2], ids[1]]);
    assert_eq!(fifth.depth(), 3);
}

#[tokio::test]
async fn test_chain_is_created_once() {
    let h = Harness::new(schedule("5.00,3.00,2.00", None), 3).await;
    let line = h.referral_line(2).await;
    let other = create_user(&h.db).await;

    // 再次构建（即使换了邀请人）返回原快照
    let again = h.chains.build_chain(line[1].id, other.id).await.unwrap();
    assert_eq!(again.ancestors, vec![line[0].id]);

    let link_rows = links::Entity::find()
        .filter(links::Column::UserId.eq(line[1].id))
        .count(&h.db)
        .await
        .unwrap();
    assert_eq!(link_rows, 1);

    let level_one = level_stats::Entity::find_by_id((line[0].id, 1))
        .one(&h.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(level_one.referral_count, 1);
}

#[tokio::test]
async fn test_existing_chains_never_change() {
    let h = Harness::new(schedule("5.00,3.00,2.00", None), 3).await;
    let line = h.referral_line(3).await;
    let before = load_chain(&h.db, line[2].id).await.unwrap().unwrap();

    let newcomer = create_user(&h.db).await;
    h.chains.build_chain(newcomer.id, line[2].id).await.unwrap();

    let after = load_chain(&h.db, line[2].id).await.unwrap().unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_level_counters_follow_the_chain() {
    let h = Harness::new(schedule("5.00,3.00,2.00", None), 3).await;
    let line = h.referral_line(4).await;

    let root_levels = level_stats::Entity::find()
        .filter(level_stats::Column::UserId.eq(line[0].id))
        .all(&h.db)
        .await
        .unwrap();
    let mut counts: Vec<(i32, i64)> = root_levels
        .iter()
        .map(|l| (l.level, l.referral_count))
        .collect();
    counts.sort();
    assert_eq!(counts, vec![(1, 1), (2, 1), (3, 1)]);
}

#[tokio::test]
async fn test_self_and_cyclic_referrals_are_rejected() {
    let h = Harness::new(schedule("5.00,3.00,2.00", None), 3).await;
    let line = h.referral_line(3).await;

    let err = h.chains.build_chain(line[0].id, line[0].id).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::Ineligible(IneligibilityReason::SelfReferral)
    ));

    // line[0] 是 line[2] 的祖先，不能再被 line[2] 邀请
    let err = h.chains.build_chain(line[0].id, line[2].id).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::Ineligible(IneligibilityReason::CyclicReferral)
    ));
    assert!(load_chain(&h.db, line[0].id).await.unwrap().is_none());
}
