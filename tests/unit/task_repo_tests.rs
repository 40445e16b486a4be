//! Unit tests for `TaskRepo`.

use std::sync::Arc;

use dealflow::models::project::NewProject;
use dealflow::models::task::{NewTask, TaskStatus};
use dealflow::persistence::{db, Database, ProjectRepo, TaskRepo};

fn breakdown(titles: &[&str]) -> Vec<NewTask> {
    titles
        .iter()
        .enumerate()
        .map(|(i, title)| NewTask {
            title: (*title).to_string(),
            description: None,
            estimated_hours: Some(4.0),
            sort_order: i64::try_from(i).expect("small index"),
        })
        .collect()
}

async fn seed_project(pool: &Arc<Database>, email: &str) -> i64 {
    let new = NewProject::email_inquiry(
        "Inventory API".to_string(),
        "API build".to_string(),
        email.to_string(),
        None,
        None,
    );
    ProjectRepo::new(Arc::clone(pool))
        .create(&new)
        .await
        .expect("create project")
        .id
}

#[tokio::test]
async fn replace_breakdown_stores_tasks_in_order() {
    let pool = Arc::new(db::connect_memory().await.expect("db"));
    let project_id = seed_project(&pool, "a@example.com").await;
    let repo = TaskRepo::new(pool);

    repo.replace_breakdown(project_id, &breakdown(&["setup", "backend", "frontend"]))
        .await
        .expect("replace");

    let tasks = repo.for_project(project_id).await.expect("fetch");
    assert_eq!(tasks.len(), 3);
    assert_eq!(tasks[0].title, "setup");
    assert_eq!(tasks[2].title, "frontend");
    assert!(tasks.iter().all(|t| t.status == TaskStatus::Pending));
}

#[tokio::test]
async fn replace_breakdown_discards_previous_set() {
    let pool = Arc::new(db::connect_memory().await.expect("db"));
    let project_id = seed_project(&pool, "a@example.com").await;
    let repo = TaskRepo::new(pool);

    repo.replace_breakdown(project_id, &breakdown(&["old a", "old b"]))
        .await
        .expect("first");
    repo.replace_breakdown(project_id, &breakdown(&["new only"]))
        .await
        .expect("second");

    let tasks = repo.for_project(project_id).await.expect("fetch");
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].title, "new only");
}

#[tokio::test]
async fn breakdowns_are_scoped_per_project() {
    let pool = Arc::new(db::connect_memory().await.expect("db"));
    let one = seed_project(&pool, "a@example.com").await;
    let two = seed_project(&pool, "b@example.com").await;
    let repo = TaskRepo::new(pool);

    repo.replace_breakdown(one, &breakdown(&["for one"]))
        .await
        .expect("one");
    repo.replace_breakdown(two, &breakdown(&["for two"]))
        .await
        .expect("two");

    assert_eq!(repo.for_project(one).await.expect("fetch").len(), 1);
    assert_eq!(repo.for_project(two).await.expect("fetch")[0].title, "for two");
}
