use anyhow::Result;

use crate::core::{
    error::InteractionError,
    id::Id,
    types::{
        HashMap,
        HashSet,
    },
    uri::Uri,
};

#[derive(Debug)]
struct Topic {
    subscription: Id,
    subscribers: HashSet<Id>,
    pending: HashSet<Id>,
}

impl Topic {
    fn is_empty(&self) -> bool {
        self.subscribers.is_empty() && self.pending.is_empty()
    }
}

/// Exact-match topic table of a realm.
///
/// Every topic has one subscription ID, shared by all of its subscribers. New subscribers receive
/// no events until they are activated.
#[derive(Debug, Default)]
pub struct TopicManager {
    topics: HashMap<Uri, Topic>,
    subscriptions: HashMap<Id, Uri>,
}

impl TopicManager {
    /// Adds a pending subscriber to a topic, returning the subscription ID.
    ///
    /// `new_subscription` is used if the topic has no subscribers yet.
    pub fn subscribe(&mut self, session: Id, topic: Uri, new_subscription: Id) -> Id {
        let entry = self.topics.entry(topic.clone()).or_insert_with(|| Topic {
            subscription: new_subscription,
            subscribers: HashSet::default(),
            pending: HashSet::default(),
        });
        if !entry.subscribers.contains(&session) {
            entry.pending.insert(session);
        }
        self.subscriptions.insert(entry.subscription, topic);
        entry.subscription
    }

    /// Starts delivering events to a pending subscriber.
    pub fn activate(&mut self, session: Id, subscription: Id) {
        if let Some(topic) = self
            .subscriptions
            .get(&subscription)
            .and_then(|topic| self.topics.get_mut(topic))
        {
            if topic.pending.remove(&session) {
                topic.subscribers.insert(session);
            }
        }
    }

    /// Removes a subscriber.
    pub fn unsubscribe(&mut self, session: Id, subscription: Id) -> Result<()> {
        let topic = match self.subscriptions.get(&subscription) {
            Some(topic) => topic.clone(),
            None => return Err(InteractionError::NoSuchSubscription.into()),
        };
        let entry = match self.topics.get_mut(&topic) {
            Some(entry) => entry,
            None => return Err(InteractionError::NoSuchSubscription.into()),
        };
        if !entry.subscribers.remove(&session) && !entry.pending.remove(&session) {
            return Err(InteractionError::NoSuchSubscription.into());
        }
        if entry.is_empty() {
            self.topics.remove(&topic);
            self.subscriptions.remove(&subscription);
        }
        Ok(())
    }

    /// Removes a session from every topic.
    pub fn remove_subscriber(&mut self, session: Id) {
        let subscriptions = self
            .topics
            .values()
            .filter(|topic| {
                topic.subscribers.contains(&session) || topic.pending.contains(&session)
            })
            .map(|topic| topic.subscription)
            .collect::<Vec<_>>();
        for subscription in subscriptions {
            self.unsubscribe(session, subscription).ok();
        }
    }

    /// The subscription ID and active subscribers of a topic.
    pub fn subscribers(&self, topic: &Uri) -> Option<(Id, Vec<Id>)> {
        self.topics.get(topic).map(|topic| {
            (
                topic.subscription,
                topic.subscribers.iter().cloned().collect(),
            )
        })
    }
}

#[cfg(test)]
mod topic_test {
    use crate::{
        core::{
            id::Id,
            uri::Uri,
        },
        router::topic::TopicManager,
    };

    fn id(value: u64) -> Id {
        Id::try_from(value).unwrap()
    }

    fn topic() -> Uri {
        Uri::try_from("com.conduit.topic").unwrap()
    }

    #[test]
    fn shares_subscription_across_subscribers() {
        let mut topics = TopicManager::default();
        let first = topics.subscribe(id(1), topic(), id(100));
        let second = topics.subscribe(id(2), topic(), id(200));
        assert_eq!(first, id(100));
        assert_eq!(second, id(100));
    }

    #[test]
    fn delivers_only_to_active_subscribers() {
        let mut topics = TopicManager::default();
        let subscription = topics.subscribe(id(1), topic(), id(100));
        assert_matches::assert_matches!(topics.subscribers(&topic()), Some((_, subscribers)) => {
            assert!(subscribers.is_empty());
        });
        topics.activate(id(1), subscription);
        assert_matches::assert_matches!(topics.subscribers(&topic()), Some((_, subscribers)) => {
            assert_eq!(subscribers, vec![id(1)]);
        });
    }

    #[test]
    fn removes_topic_after_last_subscriber() {
        let mut topics = TopicManager::default();
        let subscription = topics.subscribe(id(1), topic(), id(100));
        topics.activate(id(1), subscription);
        assert_matches::assert_matches!(topics.unsubscribe(id(2), subscription), Err(_));
        assert_matches::assert_matches!(topics.unsubscribe(id(1), subscription), Ok(()));
        assert_matches::assert_matches!(topics.subscribers(&topic()), None);
        assert_matches::assert_matches!(topics.unsubscribe(id(1), subscription), Err(_));
    }

    #[test]
    fn removes_subscriber_from_every_topic() {
        let mut topics = TopicManager::default();
        let subscription = topics.subscribe(id(1), topic(), id(100));
        topics.activate(id(1), subscription);
        topics.subscribe(id(1), Uri::try_from("com.conduit.other").unwrap(), id(101));
        topics.remove_subscriber(id(1));
        assert_matches::assert_matches!(topics.subscribers(&topic()), None);
    }
}
