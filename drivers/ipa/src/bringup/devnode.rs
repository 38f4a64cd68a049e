//! Character device node: class, number range, node, cdev.

use alloc::sync::Arc;
use core::fmt;

use ipa_core::{Error, Result, DRV_NAME};
use ipa_hal::{CharDevRegistry, DevNumber};

use super::teardown::{Release, TeardownChain};

const MINOR_COUNT: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeStep {
    Class,
    Region,
    Node,
    Cdev,
}

impl fmt::Display for NodeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Create the device node; any failure undoes the earlier sub-steps and
/// reports `NoDevice`
pub fn create(registry: &Arc<dyn CharDevRegistry>) -> Result<(DevNumber, Release)> {
    build(registry)
        .map(|(dev, chain)| (dev, chain.into_release()))
        .map_err(|e| {
            log::error!("IPA: device node: {}", e);
            Error::NoDevice
        })
}

fn build(registry: &Arc<dyn CharDevRegistry>) -> Result<(DevNumber, TeardownChain<NodeStep>)> {
    let mut chain = TeardownChain::new();

    let class = registry.create_class(DRV_NAME)?;
    let reg = registry.clone();
    chain.push(NodeStep::Class, Release::new(move || reg.destroy_class(class)));

    let dev = registry.alloc_region(DRV_NAME, MINOR_COUNT)?;
    let reg = registry.clone();
    chain.push(
        NodeStep::Region,
        Release::new(move || reg.unregister_region(dev, MINOR_COUNT)),
    );

    registry.create_node(class, dev, DRV_NAME)?;
    let reg = registry.clone();
    chain.push(NodeStep::Node, Release::new(move || reg.destroy_node(class, dev)));

    let cdev = registry.add_cdev(dev, MINOR_COUNT)?;
    let reg = registry.clone();
    chain.push(NodeStep::Cdev, Release::new(move || reg.del_cdev(cdev)));

    log::info!("IPA: device node {}:{}", dev.major, dev.minor);
    Ok((dev, chain))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipa_hal::mock::{Call, MockPlatform, Site};
    use std::vec;

    #[test]
    fn test_create_and_remove() {
        let mock = MockPlatform::new();
        let registry: Arc<dyn CharDevRegistry> = Arc::new(mock.clone());

        let (_dev, release) = create(&registry).unwrap();
        assert_eq!(
            mock.calls(),
            vec![Call::ClassCreate, Call::RegionAlloc, Call::NodeCreate, Call::CdevAdd]
        );

        mock.clear_calls();
        drop(release);
        assert_eq!(
            mock.calls(),
            vec![Call::CdevDel, Call::NodeDestroy, Call::RegionUnregister, Call::ClassDestroy]
        );
        assert!(mock.live().is_empty());
    }

    #[test]
    fn test_cdev_failure() {
        let mock = MockPlatform::new();
        mock.fail(Site::CdevAdd, 1, Error::OutOfMemory);
        let registry: Arc<dyn CharDevRegistry> = Arc::new(mock.clone());

        assert_eq!(create(&registry).map(|_| ()), Err(Error::NoDevice));
        assert_eq!(mock.count(&Call::ClassDestroy), 1);
        assert!(mock.live().is_empty());
    }
}
