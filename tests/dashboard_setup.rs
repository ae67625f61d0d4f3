mod common;

use common::{names, temp_dir, Sidecar};
use serde_json::json;

fn seed(sc: &mut Sidecar, token: &str) {
    let low = sc.create_course(token, "Low");
    let high = sc.create_course(token, "High");
    sc.create_course(token, "Empty");
    sc.create_assignment(
        token,
        json!({ "courseId": low, "name": "done", "dueDate": "2026-01-01", "isCompleted": true, "weight": 10, "grade": 50 }),
    );
    sc.create_assignment(
        token,
        json!({ "courseId": high, "name": "graded", "dueDate": "2026-01-02", "isCompleted": true, "weight": 10, "grade": 95 }),
    );
    for day in 3..=9 {
        let course = if day % 2 == 0 { &low } else { &high };
        sc.create_assignment(
            token,
            json!({ "courseId": course, "name": format!("due-{day}"), "dueDate": format!("2026-01-{day:02}") }),
        );
    }
}

#[test]
fn dashboard_truncates_upcoming_and_grades() {
    let workspace = temp_dir("coursetrack-dashboard");
    let mut sc = Sidecar::spawn();
    sc.select_workspace(&workspace);
    let token = sc.sign_in("ada");
    seed(&mut sc, &token);

    let dash = sc.ok(Some(token.as_str()), "dashboard.get", json!({}));
    assert_eq!(
        names(&dash["upcoming"]),
        ["due-3", "due-4", "due-5", "due-6", "due-7"]
    );
    assert_eq!(names(&dash["grades"]), ["High", "Low", "Empty"]);

    let dash = sc.ok(Some(token.as_str()), "dashboard.get", json!({ "limit": 2 }));
    assert_eq!(names(&dash["upcoming"]), ["due-3", "due-4"]);
    assert_eq!(names(&dash["grades"]), ["High", "Low"]);

    assert_eq!(
        sc.err_code(Some(token.as_str()), "dashboard.get", json!({ "limit": -1 })),
        "bad_params"
    );
}

#[test]
fn setup_defaults_and_updates_drive_list_defaults() {
    let workspace = temp_dir("coursetrack-setup");
    let mut sc = Sidecar::spawn_with_env(&[("COURSETRACK_SUMMARY_LIMIT", "3")]);
    sc.select_workspace(&workspace);
    let token = sc.sign_in("ada");
    seed(&mut sc, &token);

    let setup = sc.ok(Some(token.as_str()), "setup.get", json!({}));
    assert_eq!(setup["dashboard"]["summaryLimit"], json!(3));
    assert_eq!(setup["dashboard"]["courseSort"], json!("grade"));
    assert_eq!(setup["grades"]["showUngradedAs"], json!("No grade"));

    let dash = sc.ok(Some(token.as_str()), "dashboard.get", json!({}));
    assert_eq!(names(&dash["upcoming"]).len(), 3);

    sc.ok(
        Some(token.as_str()),
        "setup.update",
        json!({ "section": "dashboard", "patch": { "summaryLimit": 1, "courseSort": "name" } }),
    );
    let dash = sc.ok(Some(token.as_str()), "dashboard.get", json!({}));
    assert_eq!(names(&dash["upcoming"]), ["due-3"]);
    let listed = sc.ok(Some(token.as_str()), "courses.list", json!({}));
    assert_eq!(names(&listed["courses"]), ["Empty", "High", "Low"]);

    for bad in [
        json!({ "section": "dashboard", "patch": { "courseSort": "bogus" } }),
        json!({ "section": "dashboard", "patch": { "summaryLimit": 500 } }),
        json!({ "section": "colours", "patch": {} }),
        json!({ "section": "grades", "patch": "nope" }),
    ] {
        assert_eq!(sc.err_code(Some(token.as_str()), "setup.update", bad), "bad_params");
    }
    assert_eq!(sc.err_code(None, "setup.get", json!({})), "unauthenticated");
}

#[test]
fn settings_of_one_user_leave_others_on_defaults() {
    let workspace = temp_dir("coursetrack-setup-per-user");
    let mut sc = Sidecar::spawn();
    sc.select_workspace(&workspace);
    let ada = sc.sign_in("ada");
    let bob = sc.sign_in("bob");

    sc.ok(
        Some(ada.as_str()),
        "setup.update",
        json!({ "section": "dashboard", "patch": { "summaryLimit": 1, "courseSort": "name" } }),
    );
    let mine = sc.ok(Some(ada.as_str()), "setup.get", json!({}));
    assert_eq!(mine["dashboard"]["courseSort"], json!("name"));

    let theirs = sc.ok(Some(bob.as_str()), "setup.get", json!({}));
    assert_eq!(theirs["dashboard"]["summaryLimit"], json!(5));
    assert_eq!(theirs["dashboard"]["courseSort"], json!("grade"));

    seed(&mut sc, &bob);
    let dash = sc.ok(Some(bob.as_str()), "dashboard.get", json!({}));
    assert_eq!(names(&dash["upcoming"]).len(), 5);
}
