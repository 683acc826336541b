// Revert procedures: cut, split, combine, dispatch, return and scrap all
// round-trip back to the exact pre-operation state, and refuse when
// downstream state would make the rollback imprecise.

mod common;

use rust_decimal::Decimal;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use common::*;
use pipestock_inventory::models::{
    CombineSparesRequest, CutRollRequest, DispatchItemRequest, DispatchItemType, DispatchRequest,
    PieceStatus, ScrapItemRequest, ScrapRequest, SplitBundleRequest, StockStatus, StockType,
    TransactionHandle, TransactionType,
};
use pipestock_inventory::{
    DispatchService, ReturnService, RevertService, ScrapService, TransformService,
};
use pipestock_shared::Error;

fn dispatch_item(item_type: DispatchItemType, stock_id: Uuid, quantity: i32) -> DispatchItemRequest {
    DispatchItemRequest {
        item_type,
        stock_id,
        quantity,
        cut_piece_id: None,
        length_meters: None,
        spare_piece_ids: vec![],
        piece_count: None,
        piece_length_meters: None,
        bundle_size: None,
        pieces_per_bundle: None,
        notes: None,
    }
}

fn dispatch_request(customer_id: Uuid, items: Vec<DispatchItemRequest>) -> DispatchRequest {
    DispatchRequest {
        customer_id,
        bill_to_id: None,
        transport_id: None,
        vehicle_id: None,
        invoice_number: None,
        dispatch_date: None,
        notes: None,
        items,
    }
}

#[sqlx::test(migrations = "../migrations")]
async fn cut_then_revert_restores_full_roll(pool: PgPool) {
    let catalog = seed_catalog(&pool).await;
    let produced = produce_hdpe_rolls(&pool, &catalog, 2, 500).await;
    let full_stock = stock_for_batch(&pool, produced.batch_id, StockType::FullRoll).await;

    let transform = TransformService::new(pool.clone(), 30);
    let cut = transform
        .cut_roll(
            CutRollRequest {
                stock_id: full_stock.id,
                piece_id: None,
                cut_lengths: vec![Decimal::from(150), Decimal::from(150)],
                notes: None,
            },
            catalog.user_id,
        )
        .await
        .unwrap();

    let cut_stock = fetch_stock(&pool, cut.cut_stock_id).await;
    assert_eq!(cut_stock.quantity, 3);

    let cut_txn = transactions_for_batch(&pool, produced.batch_id)
        .await
        .into_iter()
        .find(|t| t.transaction_type == TransactionType::CutRoll)
        .unwrap();

    let revert = RevertService::new(pool.clone());
    revert
        .revert_transaction(TransactionHandle::Inv(cut_txn.id), catalog.user_id)
        .await
        .unwrap();

    // The roll is back and the pieces are gone.
    let full_stock = fetch_stock(&pool, full_stock.id).await;
    assert_eq!(full_stock.quantity, 2);
    assert_eq!(full_stock.status, StockStatus::InStock);

    let pieces = cut_pieces(&pool, cut.cut_stock_id).await;
    assert_eq!(pieces.len(), 3);
    for piece in &pieces {
        assert_eq!(piece.status, PieceStatus::SoldOut);
        assert!(piece.deleted_at.is_some());
        assert_eq!(piece.deleted_by_transaction_id, Some(cut_txn.id));
    }

    let cut_stock = fetch_stock(&pool, cut.cut_stock_id).await;
    assert_eq!(cut_stock.quantity, 0);
    assert!(cut_stock.deleted_at.is_some());

    let batch = fetch_batch(&pool, produced.batch_id).await;
    assert_eq!(batch.current_quantity, 2);
    assert_quantities_consistent(&pool).await;

    // Idempotence: the second revert is refused and changes nothing.
    let err = revert
        .revert_transaction(TransactionHandle::Inv(cut_txn.id), catalog.user_id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AlreadyReverted(_)), "got {err:?}");
    let batch = fetch_batch(&pool, produced.batch_id).await;
    assert_eq!(batch.current_quantity, 2);
}

#[sqlx::test(migrations = "../migrations")]
async fn split_then_revert_restores_bundle(pool: PgPool) {
    let catalog = seed_catalog(&pool).await;
    let produced = produce_sprinkler(&pool, &catalog, 3, 40, 6, vec![]).await;
    let bundle_stock = stock_for_batch(&pool, produced.batch_id, StockType::Bundle).await;
    let before = fetch_batch(&pool, produced.batch_id).await.current_quantity;

    let transform = TransformService::new(pool.clone(), 30);
    let split = transform
        .split_bundle(
            SplitBundleRequest {
                stock_id: bundle_stock.id,
                pieces_to_split: vec![25],
                notes: None,
            },
            catalog.user_id,
        )
        .await
        .unwrap();

    let split_txn = transactions_for_batch(&pool, produced.batch_id)
        .await
        .into_iter()
        .find(|t| t.transaction_type == TransactionType::SplitBundle)
        .unwrap();

    let revert = RevertService::new(pool.clone());
    revert
        .revert_transaction(TransactionHandle::Inv(split_txn.id), catalog.user_id)
        .await
        .unwrap();

    let bundle_stock = fetch_stock(&pool, bundle_stock.id).await;
    assert_eq!(bundle_stock.quantity, 3);

    let groups = spare_groups(&pool, split.spare_stock_id).await;
    assert!(groups.iter().all(|g| g.status == PieceStatus::SoldOut));

    let batch = fetch_batch(&pool, produced.batch_id).await;
    assert_eq!(batch.current_quantity, before);
    assert_quantities_consistent(&pool).await;
}

#[sqlx::test(migrations = "../migrations")]
async fn combine_then_revert_restores_spare_groups(pool: PgPool) {
    let catalog = seed_catalog(&pool).await;
    let produced = produce_sprinkler(&pool, &catalog, 1, 50, 6, vec![12, 8]).await;
    let spare_stock = stock_for_batch(&pool, produced.batch_id, StockType::Spare).await;
    let original_group_ids: Vec<_> = spare_groups(&pool, spare_stock.id)
        .await
        .iter()
        .map(|g| g.id)
        .collect();
    let before = fetch_batch(&pool, produced.batch_id).await.current_quantity;

    let transform = TransformService::new(pool.clone(), 30);
    let combined = transform
        .combine_spares(
            CombineSparesRequest {
                spare_piece_ids: original_group_ids.clone(),
                bundle_size: 15,
                number_of_bundles: 1,
            },
            catalog.user_id,
        )
        .await
        .unwrap();

    let combine_txn = transactions_for_batch(&pool, produced.batch_id)
        .await
        .into_iter()
        .find(|t| t.transaction_type == TransactionType::CombineSpares)
        .unwrap();

    let revert = RevertService::new(pool.clone());
    revert
        .revert_transaction(TransactionHandle::Inv(combine_txn.id), catalog.user_id)
        .await
        .unwrap();

    // Original groups are IN_STOCK again, the remainder group is gone, and
    // the combined-into bundle came back out.
    let groups = spare_groups(&pool, spare_stock.id).await;
    for id in &original_group_ids {
        let group = groups.iter().find(|g| g.id == *id).unwrap();
        assert_eq!(group.status, PieceStatus::InStock);
        assert!(group.deleted_at.is_none());
    }
    let remainder = groups
        .iter()
        .find(|g| g.id == combined.remainder_piece_id.unwrap())
        .unwrap();
    assert_eq!(remainder.status, PieceStatus::SoldOut);

    // The combine created this bundle stock, so taking its bundle back
    // empties and soft-deletes it.
    let bundle_stock = fetch_stock(&pool, combined.bundle_stock_id).await;
    assert_eq!(bundle_stock.quantity, 0);
    assert!(bundle_stock.deleted_at.is_some());

    let spare_stock = fetch_stock(&pool, spare_stock.id).await;
    assert_eq!(spare_stock.quantity, 2);
    assert!(spare_stock.deleted_at.is_none());

    let batch = fetch_batch(&pool, produced.batch_id).await;
    assert_eq!(batch.current_quantity, before);
    assert_quantities_consistent(&pool).await;
}

#[sqlx::test(migrations = "../migrations")]
async fn dispatch_round_trip_restores_everything(pool: PgPool) {
    let catalog = seed_catalog(&pool).await;
    let produced = produce_hdpe_rolls(&pool, &catalog, 1, 600).await;
    let full_stock = stock_for_batch(&pool, produced.batch_id, StockType::FullRoll).await;

    let transform = TransformService::new(pool.clone(), 30);
    let cut = transform
        .cut_roll(
            CutRollRequest {
                stock_id: full_stock.id,
                piece_id: None,
                cut_lengths: vec![Decimal::from(200), Decimal::from(200), Decimal::from(200)],
                notes: None,
            },
            catalog.user_id,
        )
        .await
        .unwrap();
    let before_batch = fetch_batch(&pool, produced.batch_id).await;

    // Dispatch everything: the batch empties and gets swept.
    let dispatch_service = DispatchService::new(pool.clone());
    let dispatched = dispatch_service
        .create_dispatch(
            dispatch_request(
                catalog.customer_id,
                vec![dispatch_item(DispatchItemType::CutRoll, cut.cut_stock_id, 3)],
            ),
            catalog.user_id,
        )
        .await
        .unwrap();

    let swept = fetch_batch(&pool, produced.batch_id).await;
    assert_eq!(swept.current_quantity, 0);
    assert!(swept.deleted_at.is_some());

    let revert = RevertService::new(pool.clone());
    revert
        .revert_transaction(
            TransactionHandle::Dispatch(dispatched.dispatch_id),
            catalog.user_id,
        )
        .await
        .unwrap();

    // Exact pre-dispatch state: piece statuses, stock quantity, batch
    // quantity, and the batch's soft-delete all restored.
    let pieces = cut_pieces(&pool, cut.cut_stock_id).await;
    assert!(pieces
        .iter()
        .all(|p| p.status == PieceStatus::InStock && p.dispatch_id.is_none()));

    let cut_stock = fetch_stock(&pool, cut.cut_stock_id).await;
    assert_eq!(cut_stock.quantity, 3);
    assert_eq!(cut_stock.status, StockStatus::InStock);

    let batch = fetch_batch(&pool, produced.batch_id).await;
    assert_eq!(batch.current_quantity, before_batch.current_quantity);
    assert!(batch.deleted_at.is_none());

    let status: String = sqlx::query("SELECT status FROM dispatches WHERE id = $1")
        .bind(dispatched.dispatch_id)
        .fetch_one(&pool)
        .await
        .unwrap()
        .get("status");
    assert_eq!(status, "REVERTED");
    assert_quantities_consistent(&pool).await;

    let err = revert
        .revert_transaction(
            TransactionHandle::Dispatch(dispatched.dispatch_id),
            catalog.user_id,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AlreadyReverted(_)), "got {err:?}");
}

#[sqlx::test(migrations = "../migrations")]
async fn partial_spare_dispatch_revert_restores_group_total(pool: PgPool) {
    let catalog = seed_catalog(&pool).await;
    let produced = produce_sprinkler(&pool, &catalog, 1, 50, 6, vec![30]).await;
    let spare_stock = stock_for_batch(&pool, produced.batch_id, StockType::Spare).await;
    let group_id = spare_groups(&pool, spare_stock.id).await[0].id;

    let mut spare = dispatch_item(DispatchItemType::SparePieces, spare_stock.id, 4);
    spare.spare_piece_ids = vec![group_id; 4];
    spare.piece_count = Some(4);

    let dispatch_service = DispatchService::new(pool.clone());
    let dispatched = dispatch_service
        .create_dispatch(
            dispatch_request(catalog.customer_id, vec![spare]),
            catalog.user_id,
        )
        .await
        .unwrap();

    let revert = RevertService::new(pool.clone());
    revert
        .revert_transaction(
            TransactionHandle::Dispatch(dispatched.dispatch_id),
            catalog.user_id,
        )
        .await
        .unwrap();

    // The shrunken group (26) and the four restored singletons together
    // carry the original 30 physical pieces.
    let groups = spare_groups(&pool, spare_stock.id).await;
    let total: i32 = groups
        .iter()
        .filter(|g| g.status == PieceStatus::InStock)
        .map(|g| g.piece_count)
        .sum();
    assert_eq!(total, 30);

    let batch = fetch_batch(&pool, produced.batch_id).await;
    assert_eq!(batch.current_quantity, 80);
    assert_quantities_consistent(&pool).await;
}

#[sqlx::test(migrations = "../migrations")]
async fn cut_with_dispatched_piece_cannot_revert(pool: PgPool) {
    let catalog = seed_catalog(&pool).await;
    let produced = produce_hdpe_rolls(&pool, &catalog, 1, 600).await;
    let full_stock = stock_for_batch(&pool, produced.batch_id, StockType::FullRoll).await;

    let transform = TransformService::new(pool.clone(), 30);
    let cut = transform
        .cut_roll(
            CutRollRequest {
                stock_id: full_stock.id,
                piece_id: None,
                cut_lengths: vec![Decimal::from(300), Decimal::from(300)],
                notes: None,
            },
            catalog.user_id,
        )
        .await
        .unwrap();

    let mut piece_item = dispatch_item(DispatchItemType::CutPiece, cut.cut_stock_id, 1);
    piece_item.cut_piece_id = Some(cut.piece_ids[0]);
    let dispatch_service = DispatchService::new(pool.clone());
    dispatch_service
        .create_dispatch(
            dispatch_request(catalog.customer_id, vec![piece_item]),
            catalog.user_id,
        )
        .await
        .unwrap();

    let cut_txn = transactions_for_batch(&pool, produced.batch_id)
        .await
        .into_iter()
        .find(|t| t.transaction_type == TransactionType::CutRoll)
        .unwrap();

    let revert = RevertService::new(pool.clone());
    let err = revert
        .revert_transaction(TransactionHandle::Inv(cut_txn.id), catalog.user_id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CannotRevert(_)), "got {err:?}");
}

#[sqlx::test(migrations = "../migrations")]
async fn return_revert_soft_deletes_created_stock(pool: PgPool) {
    let catalog = seed_catalog(&pool).await;
    let return_service = ReturnService::new(pool.clone());

    let result = return_service
        .create_return(
            pipestock_inventory::models::ReturnRequest {
                customer_id: catalog.customer_id,
                return_date: chrono::Utc::now().date_naive(),
                notes: None,
                items: vec![pipestock_inventory::models::ReturnItemRequest {
                    product_type_id: catalog.hdpe_type_id,
                    brand_id: catalog.brand_id,
                    parameters: hdpe_params(),
                    item_type: pipestock_inventory::models::ReturnItemType::FullRoll,
                    rolls: vec![
                        pipestock_inventory::models::ReturnedRoll {
                            length_meters: Decimal::from(500),
                        };
                        3
                    ],
                    bundles: vec![],
                    piece_count: None,
                    piece_length_meters: None,
                    notes: None,
                }],
            },
            catalog.user_id,
        )
        .await
        .unwrap();

    let revert = RevertService::new(pool.clone());
    revert
        .revert_transaction(TransactionHandle::Return(result.return_id), catalog.user_id)
        .await
        .unwrap();

    let status: String = sqlx::query("SELECT status FROM returns WHERE id = $1")
        .bind(result.return_id)
        .fetch_one(&pool)
        .await
        .unwrap()
        .get("status");
    assert_eq!(status, "REVERTED");

    // Every stock row the return created is soft-deleted.
    let live: i64 = sqlx::query(
        "SELECT COUNT(*) AS n FROM inventory_stock s
         JOIN batches b ON s.batch_id = b.id
         WHERE b.batch_code LIKE $1 AND s.deleted_at IS NULL",
    )
    .bind(format!("{}-%", result.return_number))
    .fetch_one(&pool)
    .await
    .unwrap()
    .get("n");
    assert_eq!(live, 0);
}

#[sqlx::test(migrations = "../migrations")]
async fn scrap_revert_restores_quantity_and_pieces(pool: PgPool) {
    let catalog = seed_catalog(&pool).await;
    let produced = produce_hdpe_rolls(&pool, &catalog, 4, 500).await;
    let stock = stock_for_batch(&pool, produced.batch_id, StockType::FullRoll).await;

    let scrap_service = ScrapService::new(pool.clone());
    let scrapped = scrap_service
        .create_scrap(
            ScrapRequest {
                reason: "Kinked rolls".to_string(),
                scrap_date: chrono::Utc::now().date_naive(),
                notes: None,
                items: vec![ScrapItemRequest {
                    stock_id: stock.id,
                    item_type: StockType::FullRoll,
                    quantity_to_scrap: 3,
                    piece_ids: vec![],
                    estimated_value: None,
                }],
            },
            catalog.user_id,
        )
        .await
        .unwrap();

    let revert = RevertService::new(pool.clone());
    revert
        .revert_transaction(TransactionHandle::Scrap(scrapped.scrap_id), catalog.user_id)
        .await
        .unwrap();

    let stock = fetch_stock(&pool, stock.id).await;
    assert_eq!(stock.quantity, 4);
    assert_eq!(stock.status, StockStatus::InStock);

    let batch = fetch_batch(&pool, produced.batch_id).await;
    assert_eq!(batch.current_quantity, 4);

    let status: String = sqlx::query("SELECT status FROM scraps WHERE id = $1")
        .bind(scrapped.scrap_id)
        .fetch_one(&pool)
        .await
        .unwrap()
        .get("status");
    assert_eq!(status, "CANCELLED");

    let err = revert
        .revert_transaction(TransactionHandle::Scrap(scrapped.scrap_id), catalog.user_id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AlreadyReverted(_)), "got {err:?}");
}

#[sqlx::test(migrations = "../migrations")]
async fn production_transactions_cannot_be_reverted(pool: PgPool) {
    let catalog = seed_catalog(&pool).await;
    let produced = produce_hdpe_rolls(&pool, &catalog, 1, 500).await;
    let production_txn = transactions_for_batch(&pool, produced.batch_id)
        .await
        .into_iter()
        .find(|t| t.transaction_type == TransactionType::Production)
        .unwrap();

    let revert = RevertService::new(pool.clone());
    let err = revert
        .revert_transaction(TransactionHandle::Inv(production_txn.id), catalog.user_id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CannotRevert(_)), "got {err:?}");
}
