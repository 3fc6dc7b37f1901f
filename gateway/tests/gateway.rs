mod common;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use common::Fault;
use common::FlakyStore;
use crm_gateway::EntityGateway;
use crm_gateway::GatewayError;
use crm_gateway::GatewayOptions;
use crm_gateway::entity::Category;
use crm_gateway::entity::Lead;
use crm_gateway::entity::Task;
use crm_gateway::entity::TeamMember;
use crm_gateway::entity::category::NewCategory;
use crm_gateway::entity::lead::LeadFields;
use crm_gateway::entity::task::NewTask;
use crm_gateway::entity::task::Priority;
use crm_gateway::entity::task::TaskPatch;
use crm_gateway::entity::team_member::MemberStatus;
use crm_gateway::entity::team_member::NewTeamMember;
use crm_gateway::entity::team_member::Permissions;
use crm_gateway::entity::team_member::TeamMemberPatch;
use crm_gateway::query::Query;
use crm_gateway::record::SortDirection;
use crm_gateway::store::memory::MemoryRecordStore;
use pretty_assertions::assert_eq;

fn member(name: &str, email: &str) -> NewTeamMember {
    NewTeamMember {
        name: name.to_string(),
        email: email.to_string(),
        ..NewTeamMember::default()
    }
}

#[tokio::test]
async fn create_merges_defaults_and_get_returns_same_record() {
    for (backend, store, _dir) in common::stores() {
        let tasks: EntityGateway<Task> = EntityGateway::new(store);
        let created = tasks.create(&NewTask::titled("Ship release")).await.unwrap();
        assert_eq!(created.title, "Ship release", "{backend}");
        assert_eq!(created.category_id, 1, "{backend}");
        assert_eq!(created.priority, Priority::Medium, "{backend}");
        assert_eq!(created.due_date, None, "{backend}");
        assert!(!created.completed && !created.archived, "{backend}");
        assert!(created.created_at.is_some(), "{backend}");

        let fetched = tasks.get_by_id(created.id).await.unwrap();
        assert_eq!(fetched, created, "{backend}");
    }
}

#[tokio::test]
async fn create_ignores_unknown_fields_and_requires_title() {
    let tasks: EntityGateway<Task> = EntityGateway::new(Arc::new(MemoryRecordStore::new()));
    let input: NewTask = serde_json::from_value(serde_json::json!({
        "title": "Plan",
        "color": "red",
        "completed": true,
    }))
    .unwrap();
    let created = tasks.create(&input).await.unwrap();
    assert!(!created.completed);

    let err = tasks.create(&NewTask::titled("   ")).await.unwrap_err();
    assert!(matches!(err, GatewayError::Validation(_)), "{err}");
    assert_eq!(tasks.get_all().await.len(), 1);
}

#[tokio::test]
async fn update_changes_only_present_fields() {
    for (backend, store, _dir) in common::stores() {
        let tasks: EntityGateway<Task> = EntityGateway::new(store);
        let input = NewTask {
            description: Some("draft".into()),
            priority: Some(Priority::High),
            due_date: NaiveDate::from_ymd_opt(2026, 10, 20),
            ..NewTask::titled("Write docs")
        };
        let created = tasks.create(&input).await.unwrap();

        let patch = TaskPatch {
            description: Some("final".into()),
            ..TaskPatch::default()
        };
        let updated = tasks.update(created.id, &patch).await.unwrap();
        assert_eq!(updated.description, "final", "{backend}");
        assert_eq!(updated.title, created.title, "{backend}");
        assert_eq!(updated.priority, Priority::High, "{backend}");
        assert_eq!(updated.due_date, created.due_date, "{backend}");

        let cleared = tasks
            .update(
                created.id,
                &TaskPatch {
                    due_date: Some(None),
                    ..TaskPatch::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(cleared.due_date, None, "{backend}");
    }
}

#[tokio::test]
async fn delete_then_get_and_second_delete_are_not_found() {
    for (backend, store, _dir) in common::stores() {
        let tasks: EntityGateway<Task> = EntityGateway::new(store);
        let created = tasks.create(&NewTask::titled("Temp")).await.unwrap();
        tasks.delete(created.id).await.unwrap();

        let err = tasks.get_by_id(created.id).await.unwrap_err();
        assert!(err.is_not_found(), "{backend}: {err}");
        let err = tasks.delete(created.id).await.unwrap_err();
        assert!(err.is_not_found(), "{backend}: {err}");
        let err = tasks
            .update(created.id, &TaskPatch::default())
            .await
            .unwrap_err();
        assert!(err.is_not_found(), "{backend}: {err}");
    }
}

#[tokio::test]
async fn bulk_delete_reports_one_outcome_per_id() {
    for (backend, store, _dir) in common::stores() {
        let tasks: EntityGateway<Task> = EntityGateway::new(store);
        let a = tasks.create(&NewTask::titled("a")).await.unwrap();
        let b = tasks.create(&NewTask::titled("b")).await.unwrap();
        let missing = b.id + 1000;

        let outcomes = tasks.bulk_delete(&[a.id, missing, b.id]).await;
        let flags: Vec<_> = outcomes.iter().map(|o| (o.id, o.success)).collect();
        assert_eq!(flags, vec![(a.id, true), (missing, false), (b.id, true)], "{backend}");
        assert!(outcomes[1].message.is_some(), "{backend}");
        assert!(tasks.get_all().await.is_empty(), "{backend}");

        let again = tasks.bulk_delete(&[a.id, b.id]).await;
        assert!(again.iter().all(|o| !o.success), "{backend}");
        assert!(tasks.bulk_delete(&[]).await.is_empty(), "{backend}");
    }
}

#[tokio::test]
async fn completing_a_task_stamps_and_reopening_clears() {
    let tasks: EntityGateway<Task> = EntityGateway::new(Arc::new(MemoryRecordStore::new()));
    let task = tasks.create(&NewTask::titled("Ship release")).await.unwrap();

    let done = tasks.set_completed(task.id, true).await.unwrap();
    assert!(done.completed);
    assert!(done.completed_at.is_some());
    assert_eq!(tasks.completed().await.len(), 1);
    assert!(tasks.pending().await.is_empty());

    let reopened = tasks.set_completed(task.id, false).await.unwrap();
    assert!(!reopened.completed);
    assert_eq!(reopened.completed_at, None);

    let archived = tasks.archive(task.id, true).await.unwrap();
    assert!(archived.archived);
    assert!(tasks.pending().await.is_empty());
}

#[tokio::test]
async fn search_matches_title_or_description_ignoring_case() {
    let tasks: EntityGateway<Task> = EntityGateway::new(Arc::new(MemoryRecordStore::new()));
    tasks.create(&NewTask::titled("Ship release")).await.unwrap();
    tasks
        .create(&NewTask {
            description: Some("before we SHIP".into()),
            ..NewTask::titled("Review")
        })
        .await
        .unwrap();
    tasks.create(&NewTask::titled("Lunch")).await.unwrap();

    let mut titles: Vec<_> = tasks.search("ship").await.into_iter().map(|t| t.title).collect();
    titles.sort();
    assert_eq!(titles, vec!["Review", "Ship release"]);
    assert_eq!(tasks.search("  ").await.len(), 3);
    assert!(tasks.search("zzz").await.is_empty());
}

#[tokio::test]
async fn overdue_and_due_on_use_open_tasks_only() {
    let tasks: EntityGateway<Task> = EntityGateway::new(Arc::new(MemoryRecordStore::new()));
    let day = |d| NaiveDate::from_ymd_opt(2026, 10, d);
    let due = |title: &str, d| NewTask {
        due_date: day(d),
        ..NewTask::titled(title)
    };
    tasks.create(&due("late", 10)).await.unwrap();
    let late_done = tasks.create(&due("late but done", 11)).await.unwrap();
    tasks.set_completed(late_done.id, true).await.unwrap();
    tasks.create(&due("today", 19)).await.unwrap();
    tasks.create(&due("later", 25)).await.unwrap();
    tasks.create(&NewTask::titled("undated")).await.unwrap();

    let today = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
    let overdue: Vec<_> = tasks.overdue_on(today).await.into_iter().map(|t| t.title).collect();
    assert_eq!(overdue, vec!["late"]);
    let due_today: Vec<_> = tasks.due_on(today).await.into_iter().map(|t| t.title).collect();
    assert_eq!(due_today, vec!["today"]);
}

#[tokio::test]
async fn reads_follow_pages_until_a_short_page() {
    for (backend, store, _dir) in common::stores() {
        let tasks: EntityGateway<Task> =
            EntityGateway::with_options(store, common::small_pages(2));
        for i in 0..5 {
            tasks.create(&NewTask::titled(format!("t{i}"))).await.unwrap();
        }
        assert_eq!(tasks.get_all().await.len(), 5, "{backend}");

        let newest: Vec<_> = tasks
            .list(Query::new().order_by("title", SortDirection::Desc).limit(2))
            .await
            .into_iter()
            .map(|t| t.title)
            .collect();
        assert_eq!(newest, vec!["t4", "t3"], "{backend}");
    }
}

#[tokio::test]
async fn unknown_query_field_is_a_failed_read() {
    let tasks: EntityGateway<Task> = EntityGateway::new(Arc::new(MemoryRecordStore::new()));
    tasks.create(&NewTask::titled("x")).await.unwrap();
    let query = Query::new().order_by("nope", SortDirection::Asc);
    assert!(tasks.list(query.clone()).await.is_empty());
    assert!(matches!(
        tasks.try_list(query).await,
        Err(GatewayError::Validation(_))
    ));
}

#[tokio::test]
async fn duplicate_lead_site_is_rejected() {
    for (backend, store, _dir) in common::stores() {
        let leads: EntityGateway<Lead> = EntityGateway::new(store);
        let lead = leads.create(&LeadFields::for_site("acme.io")).await.unwrap();
        assert_eq!(lead.name, "acme.io", "{backend}");
        assert_eq!(lead.status, "Keep an Eye", "{backend}");
        assert_eq!(lead.added_by_name, "Current User", "{backend}");

        let err = leads
            .create(&LeadFields::for_site("  acme.io "))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)), "{backend}: {err}");
        assert_eq!(leads.get_all().await.len(), 1, "{backend}");

        let err = leads.create(&LeadFields::default()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)), "{backend}: {err}");
    }
}

#[tokio::test]
async fn team_email_is_unique_ignoring_case() {
    for (backend, store, _dir) in common::stores() {
        let team: EntityGateway<TeamMember> = EntityGateway::new(store);
        let ana = team.invite(&member("Ana", "Ana@Example.com")).await.unwrap();
        assert_eq!(ana.email, "ana@example.com", "{backend}");
        assert_eq!(ana.status, MemberStatus::Pending, "{backend}");
        assert!(ana.permissions.dashboard && !ana.permissions.leads, "{backend}");

        let err = team
            .invite(&member("Other Ana", " ANA@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)), "{backend}: {err}");

        let bo = team.invite(&member("Bo", "bo@example.com")).await.unwrap();
        let steal = TeamMemberPatch {
            email: Some("ana@example.com".into()),
            ..TeamMemberPatch::default()
        };
        let err = team.update(bo.id, &steal).await.unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)), "{backend}: {err}");

        let keep = TeamMemberPatch {
            email: Some("ANA@example.com".into()),
            role: Some("admin".into()),
            ..TeamMemberPatch::default()
        };
        let ana = team.update(ana.id, &keep).await.unwrap();
        assert_eq!(ana.role, "admin", "{backend}");
    }
}

#[tokio::test]
async fn team_lifecycle() {
    let team: EntityGateway<TeamMember> =
        EntityGateway::new(Arc::new(MemoryRecordStore::new()));
    let bo = team.invite(&member("Bo", "bo@example.com")).await.unwrap();
    assert_eq!(bo.last_login, None);

    let active = team.activate(bo.id).await.unwrap();
    assert_eq!(active.status, MemberStatus::Active);
    assert!(active.last_login.is_some());
    assert!(active.updated_at >= bo.updated_at);

    let inactive = team.deactivate(bo.id).await.unwrap();
    assert_eq!(inactive.status, MemberStatus::Inactive);

    team.remove(bo.id).await.unwrap();
    assert!(team.remove(bo.id).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn stored_null_permissions_fall_back_to_defaults() {
    let store = Arc::new(MemoryRecordStore::new());
    let raw = serde_json::json!({"Name": "A", "email_c": "a@x.io", "permissions_c": "null"});
    let id = store
        .insert_raw("team_c", raw.as_object().cloned().unwrap_or_default())
        .await;
    let team: EntityGateway<TeamMember> = EntityGateway::new(store);

    let all = team.get_all().await;
    assert_eq!(all.len(), 1);
    let member = team.get_by_id(id).await.unwrap();
    assert_eq!(member.permissions, Permissions::default());
}

#[tokio::test]
async fn store_rejects_duplicate_when_pre_check_sees_nothing() {
    let inner = Arc::new(MemoryRecordStore::new());
    let blind = FlakyStore::new(Arc::clone(&inner)).on_fetch(|_, _| Some(Fault::Hide));
    let leads: EntityGateway<Lead> = EntityGateway::new(Arc::new(blind));

    leads.create(&LeadFields::for_site("acme.io")).await.unwrap();
    let err = leads
        .create(&LeadFields::for_site("acme.io"))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Validation(_)), "{err}");
    assert_eq!(inner.row_count("lead_c").await, 1);
}

#[tokio::test]
async fn concurrent_duplicate_creates_leave_one_record() {
    let store = Arc::new(MemoryRecordStore::new());
    let leads: EntityGateway<Lead> = EntityGateway::new(store.clone());
    let input = LeadFields::for_site("race.io");
    let attempts = futures::future::join_all((0..8).map(|_| leads.create(&input)))
    .await;
    assert_eq!(attempts.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(store.row_count("lead_c").await, 1);
}

#[tokio::test]
async fn reads_fail_soft_and_writes_fail_loud_when_store_is_down() {
    let inner = Arc::new(MemoryRecordStore::new());
    let flaky = Arc::new(FlakyStore::new(Arc::clone(&inner)));
    let tasks: EntityGateway<Task> = EntityGateway::new(flaky.clone());
    let task = tasks.create(&NewTask::titled("kept")).await.unwrap();

    flaky.set_down(true);
    assert!(tasks.get_all().await.is_empty());
    assert!(tasks.search("kept").await.is_empty());
    assert!(matches!(
        tasks.get_by_id(task.id).await,
        Err(GatewayError::RemoteFailure(_))
    ));
    assert!(matches!(
        tasks.create(&NewTask::titled("lost")).await,
        Err(GatewayError::RemoteFailure(_))
    ));
    let outcomes = tasks.bulk_delete(&[task.id]).await;
    assert_eq!(outcomes.len(), 1);
    assert!(!outcomes[0].success);

    flaky.set_down(false);
    assert_eq!(tasks.get_all().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn slow_store_times_out() {
    let inner = Arc::new(MemoryRecordStore::new());
    let hanging = FlakyStore::new(Arc::clone(&inner)).on_fetch(|_, _| Some(Fault::Hang));
    let options = GatewayOptions {
        call_timeout: Duration::from_secs(2),
        ..GatewayOptions::default()
    };
    let tasks: EntityGateway<Task> = EntityGateway::with_options(Arc::new(hanging), options);

    assert!(tasks.get_all().await.is_empty());
    assert!(matches!(
        tasks.count(Query::new()).await,
        Err(GatewayError::Timeout(d)) if d == Duration::from_secs(2)
    ));
}

#[tokio::test]
async fn category_counts_skip_archived_and_degrade_per_category() {
    let inner = Arc::new(MemoryRecordStore::new());
    let flaky = Arc::new(FlakyStore::new(Arc::clone(&inner)).on_fetch(|table, params| {
        (table == "task_c" && common::filters_on(params, "category_id_c", 2))
            .then_some(Fault::Refuse)
    }));
    let healthy: EntityGateway<Task> = EntityGateway::new(inner.clone());
    let categories: EntityGateway<Category> = EntityGateway::new(inner.clone());
    let work = categories
        .create(&NewCategory {
            name: "Work".into(),
            ..NewCategory::default()
        })
        .await
        .unwrap();
    let home = categories
        .create(&NewCategory {
            name: "Home".into(),
            ..NewCategory::default()
        })
        .await
        .unwrap();
    assert_eq!((work.id, home.id), (1, 2));
    assert_eq!(work.color, "#5B4FE9");
    assert_eq!(work.task_count, 0);

    for (title, category) in [("a", 1), ("b", 2), ("c", 2)] {
        healthy
            .create(&NewTask {
                category_id: Some(category),
                ..NewTask::titled(title)
            })
            .await
            .unwrap();
    }
    let c = healthy.get_all().await.into_iter().find(|t| t.title == "c").unwrap();
    healthy.archive(c.id, true).await.unwrap();

    let counts = categories.task_counts(&healthy).await;
    assert_eq!(counts, BTreeMap::from([(1, 1), (2, 1)]));

    let flaky_tasks: EntityGateway<Task> = EntityGateway::new(flaky);
    let counts = categories.task_counts(&flaky_tasks).await;
    assert_eq!(counts, BTreeMap::from([(1, 1), (2, 0)]));

    let stored = categories.refresh_task_counts(&healthy).await;
    assert_eq!(stored, BTreeMap::from([(1, 1), (2, 1)]));
    assert_eq!(categories.get_by_id(2).await.unwrap().task_count, 1);
}
