use std::sync::Arc;

use grievance_common::{ListFilter, PageRequest, PortalEntry, RawRecord, SourceKind};
use grievance_intake::sources::SourceAdapter;
use grievance_intake::testing::{
    fast_store_settings, memory_store, municipality_listing, portal_entry, social_post,
    FailingSource, StaticSource,
};
use grievance_store::{GrievanceStore, MemorySheet, SheetStore};
use grievance_intake::Orchestrator;

fn orchestrator(store: Arc<dyn grievance_store::GrievanceStore>) -> Orchestrator {
    Orchestrator::builder().store(store).workers(2).build()
}

async fn all_records(
    store: &Arc<dyn grievance_store::GrievanceStore>,
) -> Vec<grievance_common::Grievance> {
    store
        .list(&ListFilter::default(), PageRequest::default())
        .await
        .unwrap()
        .items
}

#[tokio::test]
async fn rerunning_a_cycle_creates_nothing() {
    let (store, _sheet) = memory_store();
    let sources: Vec<Arc<dyn SourceAdapter>> = vec![
        Arc::new(StaticSource::paged(
            "CPGRAMS",
            vec![
                vec![portal_entry("CPGRAMS", "PG-1", "Pothole near bus stand")],
                vec![portal_entry("CPGRAMS", "PG-2", "Sewage overflow in lane 4")],
            ],
        )),
        Arc::new(StaticSource::single(
            "MCD",
            vec![municipality_listing("MCD", "Garbage not collected for a week", "Rohini")],
        )),
        Arc::new(StaticSource::single(
            "social",
            vec![social_post("101", "Street light not working on Ring Road for days")],
        )),
    ];
    let orchestrator = orchestrator(store.clone());

    let first = orchestrator.run_cycle(&sources).await;
    assert_eq!(first.created(), 4);
    assert_eq!(first.failed_sources(), 0);

    let second = orchestrator.run_cycle(&sources).await;
    assert_eq!(second.created(), 0);
    assert_eq!(second.updated(), 4);

    let records = all_records(&store).await;
    assert_eq!(records.len(), 4);
    for g in &records {
        assert_eq!(g.version, 2, "{} should have been refreshed once", g.ticket_id);
        assert!(g.updated_at >= g.created_at);
    }
}

#[tokio::test]
async fn same_source_ref_yields_one_ticket() {
    let (store, _sheet) = memory_store();
    let changed = PortalEntry {
        portal: "CPGRAMS".into(),
        complaint_id: Some("PG-7".into()),
        title: Some("Pothole near bus stand".into()),
        details: "Pothole near bus stand has grown larger after rain".into(),
        ..Default::default()
    };
    let source: Arc<dyn SourceAdapter> = Arc::new(StaticSource::single(
        "CPGRAMS",
        vec![
            portal_entry("CPGRAMS", "PG-7", "Pothole near bus stand"),
            RawRecord::Portal(changed.clone()),
        ],
    ));

    let summary = orchestrator(store.clone()).run_cycle(&[source]).await;
    assert_eq!(summary.created(), 1);
    assert_eq!(summary.updated(), 1);

    let records = all_records(&store).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].description, changed.details);
}

#[tokio::test]
async fn near_duplicates_merge_at_threshold() {
    let (store, _sheet) = memory_store();
    let source: Arc<dyn SourceAdapter> = Arc::new(StaticSource::single(
        "MCD",
        vec![
            municipality_listing("MCD", "Garbage dump near ward office", "Karol Bagh"),
            municipality_listing("MCD", "Garbage dump near ward", "Karol Bagh"),
        ],
    ));

    let summary = orchestrator(store.clone()).run_cycle(&[source]).await;
    assert_eq!(summary.created(), 1);
    assert_eq!(summary.updated(), 1);
    assert_eq!(all_records(&store).await.len(), 1);
}

#[tokio::test]
async fn below_threshold_creates_two_tickets() {
    let (store, _sheet) = memory_store();
    let source: Arc<dyn SourceAdapter> = Arc::new(StaticSource::single(
        "MCD",
        vec![
            municipality_listing("MCD", "Water supply disruption sector 22", "Chandigarh"),
            municipality_listing("MCD", "Water supply restored sector 22", "Chandigarh"),
        ],
    ));

    let summary = orchestrator(store.clone()).run_cycle(&[source]).await;
    assert_eq!(summary.created(), 2);
    assert_eq!(all_records(&store).await.len(), 2);
}

#[tokio::test]
async fn same_title_in_another_locality_is_a_new_ticket() {
    let (store, _sheet) = memory_store();
    let source: Arc<dyn SourceAdapter> = Arc::new(StaticSource::single(
        "MCD",
        vec![
            municipality_listing("MCD", "Garbage not collected", "Rohini"),
            municipality_listing("MCD", "Garbage not collected", "Dwarka"),
        ],
    ));

    let summary = orchestrator(store).run_cycle(&[source]).await;
    assert_eq!(summary.created(), 2);
}

#[tokio::test]
async fn failing_municipality_does_not_stop_social() {
    let (store, _sheet) = memory_store();
    let sources: Vec<Arc<dyn SourceAdapter>> = vec![
        Arc::new(FailingSource::unavailable("MCD", SourceKind::MunicipalityScrape)),
        Arc::new(FailingSource::format_changed("Chandigarh MC", SourceKind::MunicipalityScrape)),
        Arc::new(StaticSource::single(
            "social",
            vec![
                social_post("201", "Overflowing drain outside the school gate again"),
                social_post("202", "No water supply in Sector 9 since morning"),
            ],
        )),
    ];

    let summary = orchestrator(store.clone()).run_cycle(&sources).await;

    let mcd = summary.source("MCD").unwrap();
    assert!(!mcd.succeeded());
    assert!(mcd.error.as_deref().unwrap().contains("unavailable"));
    assert!(!summary.source("Chandigarh MC").unwrap().succeeded());

    let social = summary.source("social").unwrap();
    assert!(social.succeeded());
    assert_eq!(social.created, 2);
    assert_eq!(all_records(&store).await.len(), 2);
}

#[tokio::test]
async fn unusable_records_are_rejected_and_counted() {
    let (store, _sheet) = memory_store();
    let source: Arc<dyn SourceAdapter> = Arc::new(StaticSource::single(
        "social",
        vec![
            social_post("301", "fix it"),
            social_post("302", "   "),
            social_post("303", "Broken manhole cover on the main market road"),
        ],
    ));

    let summary = orchestrator(store).run_cycle(&[source]).await;
    let social = summary.source("social").unwrap();
    assert_eq!(social.rejected, 2);
    assert_eq!(social.created, 1);
    assert!(social.succeeded());
}

#[tokio::test]
async fn cancellation_is_checked_before_each_record() {
    let (store, _sheet) = memory_store();
    let orchestrator = orchestrator(store.clone());
    let source = Arc::new(
        StaticSource::paged(
            "CPGRAMS",
            vec![
                vec![
                    portal_entry("CPGRAMS", "PG-1", "Pothole near bus stand"),
                    portal_entry("CPGRAMS", "PG-2", "Sewage overflow in lane 4"),
                ],
                vec![portal_entry("CPGRAMS", "PG-3", "Broken footpath tiles")],
                vec![portal_entry("CPGRAMS", "PG-4", "Stray cattle on highway")],
            ],
        )
        .cancelling_on(1, orchestrator.cancel_handle()),
    );

    let summary = orchestrator.run_source(source.clone()).await;
    assert!(summary.cancelled);
    assert_eq!(summary.pages, 2);
    assert_eq!(summary.created, 2);
    assert_eq!(source.fetch_count(), 2);
    assert_eq!(all_records(&store).await.len(), 2);
    // The interrupted page is fetched again next time.
    assert_eq!(orchestrator.resume_cursor("CPGRAMS").as_deref(), Some("1"));
}

#[tokio::test]
async fn persistence_outage_stops_only_that_source() {
    let (store, sheet) = memory_store();
    sheet.fail_next(100, 503);
    let source: Arc<dyn SourceAdapter> = Arc::new(StaticSource::single(
        "CPGRAMS",
        vec![
            portal_entry("CPGRAMS", "PG-1", "Pothole near bus stand"),
            portal_entry("CPGRAMS", "PG-2", "Sewage overflow in lane 4"),
        ],
    ));

    let summary = orchestrator(store).run_cycle(&[source]).await;
    let cpgrams = summary.source("CPGRAMS").unwrap();
    assert_eq!(cpgrams.failed, 1);
    assert_eq!(cpgrams.created, 0);
    assert!(cpgrams
        .error
        .as_deref()
        .unwrap()
        .contains("Persistence unavailable"));
}

#[tokio::test]
async fn rejected_ticket_absorbs_rescrapes() {
    let (store, _sheet) = memory_store();
    let source: Arc<dyn SourceAdapter> = Arc::new(StaticSource::single(
        "CPGRAMS",
        vec![portal_entry("CPGRAMS", "PG-9", "Hoarding blocking footpath")],
    ));
    let orchestrator = orchestrator(store.clone());
    orchestrator.run_cycle(&[source.clone()]).await;

    let ticket = all_records(&store).await.remove(0);
    store
        .update(
            &ticket.ticket_id,
            ticket.version,
            grievance_common::GrievancePatch::status(
                grievance_common::GrievanceStatus::Rejected,
                chrono::Utc::now(),
            ),
        )
        .await
        .unwrap();

    let summary = orchestrator.run_cycle(&[source]).await;
    assert_eq!(summary.duplicates(), 1);
    assert_eq!(summary.created(), 0);
    let records = all_records(&store).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].version, 2);
}

#[tokio::test]
async fn direct_ingest_reports_outcome() {
    let (store, _sheet) = memory_store();
    let orchestrator = orchestrator(store);
    let raw = portal_entry("CPGRAMS", "PG-11", "Open manhole near temple");
    let draft = grievance_intake::normalize(raw, chrono::Utc::now()).unwrap();

    let created = orchestrator.ingest(draft.clone()).await.unwrap();
    assert!(matches!(created, grievance_intake::IngestOutcome::Created(_)));
    let updated = orchestrator.ingest(draft).await.unwrap();
    assert!(matches!(updated, grievance_intake::IngestOutcome::Updated(_)));
    assert_eq!(created.ticket_id(), updated.ticket_id());
}

#[tokio::test]
async fn cycle_after_a_cancelled_one_runs_normally() {
    let (store, _sheet) = memory_store();
    let orchestrator = orchestrator(store.clone());
    let first: Vec<Arc<dyn SourceAdapter>> = vec![Arc::new(StaticSource::single(
        "CPGRAMS",
        vec![portal_entry("CPGRAMS", "PG-1", "Pothole near bus stand")],
    ))];
    let second: Vec<Arc<dyn SourceAdapter>> = vec![Arc::new(StaticSource::single(
        "MCD",
        vec![municipality_listing("MCD", "Garbage not collected for a week", "Rohini")],
    ))];

    orchestrator.cancel();
    let cancelled = orchestrator.run_cycle(&first).await;
    assert!(cancelled.sources[0].cancelled);
    assert_eq!(cancelled.created(), 0);

    let next = orchestrator.run_cycle(&second).await;
    assert!(!next.sources[0].cancelled);
    assert_eq!(next.created(), 1);
    assert_eq!(all_records(&store).await.len(), 1);
}

#[tokio::test]
async fn cycle_sees_rows_written_by_another_store() {
    let sheet = Arc::new(MemorySheet::new());
    let local: Arc<dyn GrievanceStore> =
        Arc::new(SheetStore::new(sheet.clone(), &fast_store_settings()));
    let remote: Arc<dyn GrievanceStore> =
        Arc::new(SheetStore::new(sheet.clone(), &fast_store_settings()));
    let local_orchestrator = orchestrator(local.clone());

    // Load the local index while the sheet is still empty.
    assert!(all_records(&local).await.is_empty());
    assert!(local
        .get_by_fingerprint("unused")
        .await
        .unwrap()
        .is_none());

    let entry = || -> Vec<Arc<dyn SourceAdapter>> {
        vec![Arc::new(StaticSource::single(
            "CPGRAMS",
            vec![portal_entry("CPGRAMS", "PG-9", "Sewage overflow in lane 4")],
        ))]
    };
    let written = orchestrator(remote).run_cycle(&entry()).await;
    assert_eq!(written.created(), 1);

    let summary = local_orchestrator.run_cycle(&entry()).await;
    assert_eq!(summary.created(), 0);
    assert_eq!(summary.updated(), 1);
    assert_eq!(all_records(&local).await.len(), 1);
}
