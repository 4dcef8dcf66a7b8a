//! Property-based tests for the issue flow's write-once fields

use super::tests::FlowHarness;
use super::*;
use crate::dialog::DialogTurnStatus;
use proptest::prelude::*;

fn arb_value() -> impl Strategy<Value = Option<String>> {
    proptest::option::of("[a-z][a-z0-9-]{0,11}")
}

fn arb_state() -> impl Strategy<Value = IssueCollectionState> {
    (arb_value(), arb_value(), arb_value()).prop_map(|(repo_name, title, body)| {
        IssueCollectionState {
            repo_name,
            title,
            body,
        }
    })
}

fn arb_field() -> impl Strategy<Value = IssueField> {
    prop_oneof![
        Just(IssueField::RepoName),
        Just(IssueField::Title),
        Just(IssueField::Body),
    ]
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_filled_fields_are_never_overwritten(
        initial in arb_state(),
        field in arb_field(),
        reply in "[a-zA-Z ]{0,20}",
    ) {
        let mut state = initial.clone();
        let before = initial.field(field).map(str::to_string);
        let changed = state.fill(field, &reply);

        if before.is_some() {
            prop_assert!(!changed);
            prop_assert_eq!(state, initial);
        } else {
            prop_assert_eq!(changed, !reply.trim().is_empty());
        }
    }

    #[test]
    fn prop_merge_is_idempotent(initial in arb_state(), seeded in arb_state()) {
        let options = serde_json::json!({
            "repoName": seeded.repo_name,
            "issueTitle": seeded.title,
            "issueBody": seeded.body,
        });
        let mut once = initial.clone();
        once.merge_options(&options);
        let mut twice = once.clone();
        prop_assert!(!twice.merge_options(&options));
        prop_assert_eq!(&twice, &once);

        for field in IssueField::ALL {
            if let Some(existing) = initial.field(field) {
                prop_assert_eq!(once.field(field), Some(existing));
            }
        }
    }

    #[test]
    fn prop_starting_the_flow_only_asks_for_missing_fields(initial in arb_state()) {
        let rt = runtime();
        rt.block_on(async {
            let harness = FlowHarness::new();
            harness.seed(&initial).await;
            let (result, sent) = harness.turn("create an issue", Some(serde_json::json!({}))).await;
            let result = result.unwrap();

            match IssueField::ALL.into_iter().find(|f| initial.field(*f).is_none()) {
                Some(missing) => {
                    assert_eq!(result.status, DialogTurnStatus::Waiting);
                    assert_eq!(sent, vec![missing.prompt()]);
                    assert_eq!(harness.state().await.unwrap(), initial);
                }
                None => {
                    assert_eq!(result.status, DialogTurnStatus::Complete);
                    assert_eq!(harness.issues.posts().len(), 1);
                }
            }
        });
    }
}
