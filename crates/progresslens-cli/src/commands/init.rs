//! The `progresslens init` command.

use std::path::Path;

use anyhow::Result;

pub fn execute() -> Result<()> {
    write_once("progresslens.toml", SAMPLE_CONFIG)?;
    write_once("progresslens-snapshot.json", SAMPLE_SNAPSHOT)?;

    println!("\nNext steps:");
    println!("  1. Point [store] path in progresslens.toml at your exported snapshot");
    println!("  2. Run: progresslens validate");
    println!("  3. Run: progresslens summary");

    Ok(())
}

fn write_once(path: &str, content: &str) -> Result<()> {
    if Path::new(path).exists() {
        println!("{path} already exists, skipping.");
    } else {
        std::fs::write(path, content)?;
        println!("Created {path}");
    }
    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# progresslens configuration

default_teacher = "demo-teacher"

[store]
type = "snapshot"
path = "progresslens-snapshot.json"
poll_interval_ms = 2000

[engine]
concurrency = 4
store_timeout_ms = 10000
attention_limit = 5
lesson_type = "lesson"
recent_limit = 5
"#;

const SAMPLE_SNAPSHOT: &str = r#"{
  "courses": [
    { "id": "algebra-1", "name": "Algebra I", "teacherId": "demo-teacher" },
    { "id": "biology", "name": "Biology", "teacherId": "demo-teacher" }
  ],
  "students": [
    {
      "id": "ada",
      "name": "Ada Lovelace",
      "email": "ada@school.test",
      "status": "active",
      "enrolledCourseIds": ["algebra-1", "biology"]
    },
    {
      "id": "alan",
      "name": "Alan Turing",
      "email": "alan@school.test",
      "status": "active",
      "enrolledCourseIds": ["algebra-1"]
    },
    {
      "id": "grace",
      "name": "Grace Hopper",
      "email": "grace@school.test",
      "status": "inactive",
      "enrolledCourseIds": ["biology"]
    }
  ],
  "assignments": [
    {
      "id": "alg-hw1",
      "courseId": "algebra-1",
      "title": "Linear equations",
      "type": "homework",
      "dueDate": "2024-09-10",
      "maxPoints": 100,
      "createdAt": "2024-09-02T08:00:00Z"
    },
    {
      "id": "alg-l1",
      "courseId": "algebra-1",
      "title": "Graphing lines",
      "type": "lesson",
      "maxPoints": 10,
      "createdAt": { "_seconds": 1725436800, "_nanoseconds": 0 }
    },
    {
      "id": "bio-l1",
      "courseId": "biology",
      "title": "The cell",
      "type": "lesson",
      "maxPoints": 10,
      "createdAt": "2024-09-03 09:00:00"
    }
  ],
  "submissions": [
    {
      "id": "s1",
      "studentId": "ada",
      "assignmentId": "alg-hw1",
      "courseId": "algebra-1",
      "submittedAt": "2024-09-09T18:30:00Z",
      "grade": 94,
      "late": false,
      "timeSpent": 45,
      "questionsAsked": 2,
      "difficultyRating": 2
    },
    {
      "id": "s2",
      "studentId": "alan",
      "assignmentId": "alg-hw1",
      "courseId": "algebra-1",
      "submittedAt": { "_seconds": 1726070400, "_nanoseconds": 0 },
      "grade": 58,
      "isLate": true,
      "timeSpent": 70,
      "questionsAsked": 5,
      "difficultyRating": 4
    },
    {
      "id": "s3",
      "studentId": "ada",
      "assignmentId": "alg-l1",
      "courseId": "algebra-1",
      "submittedAt": "2024-09-05 10:15:00",
      "grade": 9,
      "timeSpent": 15,
      "questionsAsked": 1,
      "difficultyRating": 3
    },
    {
      "id": "s4",
      "studentId": "grace",
      "assignmentId": "bio-l1",
      "courseId": "biology",
      "submittedAt": "2024-09-04T14:00:00Z",
      "timeSpent": 25,
      "questionsAsked": 0
    }
  ]
}
"#;
