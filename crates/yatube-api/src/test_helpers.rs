use uuid::Uuid;

use yatube_db::Database;
use yatube_types::api::Claims;

use crate::middleware::Viewer;

pub(crate) struct TestUser {
    pub id: String,
    pub username: String,
    pub viewer: Viewer,
}

pub(crate) fn create_user(db: &Database, username: &str) -> TestUser {
    let id = Uuid::new_v4();
    db.create_user(&id.to_string(), username, "not-a-real-hash").unwrap();
    TestUser {
        id: id.to_string(),
        username: username.to_string(),
        viewer: Viewer::authenticated(Claims {
            sub: id,
            username: username.to_string(),
            exp: usize::MAX,
        }),
    }
}

pub(crate) fn create_group(db: &Database, slug: &str) -> Uuid {
    let id = Uuid::new_v4();
    db.create_group(&id.to_string(), &format!("Group {}", slug), slug, "test_description")
        .unwrap();
    id
}

/// Posts `text0` .. `text{n-1}`, oldest first.
pub(crate) fn seed_posts(db: &Database, author: &TestUser, n: usize) {
    for i in 0..n {
        db.insert_post(&Uuid::new_v4().to_string(), &author.id, &format!("text{}", i), None, None)
            .unwrap();
    }
}
